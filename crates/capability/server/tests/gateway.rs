//! 网关端到端测试：真实 TCP 回环上驱动三种协议。

use geotrack_server::{Listener, ServerConfig, SessionIndex};
use geotrack_storage::{DeviceRecord, InMemoryDeviceRegistry, InMemoryPositionSink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const IO_DEADLINE: Duration = Duration::from_secs(5);

struct Gateway {
    addr: SocketAddr,
    index: Arc<SessionIndex>,
    shutdown: watch::Sender<bool>,
    registry: Arc<InMemoryDeviceRegistry>,
    sink: Arc<InMemoryPositionSink>,
}

async fn start_gateway(mut config: ServerConfig) -> Gateway {
    config.tcp_port = 0;
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let sink = Arc::new(InMemoryPositionSink::new());
    let listener = Listener::bind(config, registry.clone(), sink.clone())
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let index = listener.index();

    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(listener.run(rx));

    Gateway {
        addr,
        index,
        shutdown,
        registry,
        sink,
    }
}

fn gt06_checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, byte| acc ^ u16::from(*byte))
}

fn gt06_frame(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x78, 0x78, (payload.len() + 1) as u8, msg_type];
    frame.extend_from_slice(payload);
    let crc = gt06_checksum(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&[0x0D, 0x0A]);
    frame
}

const GT06_IMEI: [u8; 8] = [0x03, 0x53, 0x41, 0x90, 0x21, 0x77, 0x66, 0x10];
const GT06_UNIQUE_ID: &str = "0353419021776610";

fn gt06_location_payload() -> Vec<u8> {
    vec![
        0x0F, // 有效位 + 3 颗卫星
        0x22, 0x37, 0x75, 0x14, // lat
        0x74, 0x08, 0x62, 0x14, // lon
        0x28, // speed
        0x01, 0x44, // course
        0x23, 0x02, 0x14, 0x12, 0x15, 0x13, // time
    ]
}

fn teltonika_frame(latitude: f64, longitude: f64) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&latitude.to_be_bytes());
    frame.extend_from_slice(&longitude.to_be_bytes());
    frame.extend_from_slice(&100.5f32.to_be_bytes());
    frame.extend_from_slice(&455u16.to_be_bytes());
    frame.extend_from_slice(&180u16.to_be_bytes());
    frame
}

async fn read_some(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = [0u8; 256];
    let n = timeout(IO_DEADLINE, stream.read(&mut buf))
        .await
        .expect("read deadline")
        .expect("read");
    buf[..n].to_vec()
}

async fn read_eof(stream: &mut TcpStream) {
    let mut buf = [0u8; 256];
    loop {
        let n = timeout(IO_DEADLINE, stream.read(&mut buf))
            .await
            .expect("eof deadline")
            .expect("read");
        if n == 0 {
            return;
        }
    }
}

/// 等待下游收齐指定数量的位置记录。
async fn wait_for_positions(sink: &InMemoryPositionSink, count: usize) {
    timeout(IO_DEADLINE, async {
        while sink.len() < count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("positions arrived");
}

#[tokio::test]
async fn gt06_login_then_location_reaches_sink() {
    let gateway = start_gateway(ServerConfig::default()).await;
    gateway
        .registry
        .register(DeviceRecord::new(GT06_UNIQUE_ID, "tracker-1"));

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");

    // 登录帧 → 登录应答
    stream
        .write_all(&gt06_frame(0x01, &GT06_IMEI))
        .await
        .expect("write login");
    let ack = read_some(&mut stream).await;
    assert_eq!(&ack[..2], &[0x78, 0x78]);
    assert_eq!(ack[3], 0x01);

    // 定位帧 → 定位应答 + 下游记录
    stream
        .write_all(&gt06_frame(0x12, &gt06_location_payload()))
        .await
        .expect("write location");
    let ack = read_some(&mut stream).await;
    assert_eq!(&ack[..4], &[0x78, 0x78, 0x05, 0x12]);

    wait_for_positions(&gateway.sink, 1).await;
    let positions = gateway.sink.positions();
    assert_eq!(positions[0].device_id, GT06_UNIQUE_ID);
    assert_eq!(positions[0].speed, 40.0);
    assert_eq!(positions[0].course, 324.0);
    assert_eq!(positions[0].satellites, 3);
    assert!(positions[0].valid);

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn unknown_device_closes_without_ack() {
    let gateway = start_gateway(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    stream
        .write_all(&gt06_frame(0x01, &GT06_IMEI))
        .await
        .expect("write login");

    // 无应答，直接收到 FIN
    let mut buf = [0u8; 64];
    let n = timeout(IO_DEADLINE, stream.read(&mut buf))
        .await
        .expect("read deadline")
        .expect("read");
    assert_eq!(n, 0, "expected close without ack, got {:?}", &buf[..n]);
    assert!(gateway.sink.is_empty());
    assert!(gateway.index.is_empty());

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn h02_test_device_bypasses_registry() {
    let config = ServerConfig {
        test_mode: true,
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");

    // 首帧只用于鉴权
    stream
        .write_all(b"*HQ,V1,test-001,A,2237.7514,N,11408.6214,E,6,2,151022,10,1,6#")
        .await
        .expect("write auth frame");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");
    assert!(gateway.sink.is_empty());

    // 后续帧正常解码发布
    stream
        .write_all(b"*HQ,V1,test-001,A,2237.7514,N,11408.6214,E,6,2,151022,10,1,6#")
        .await
        .expect("write location");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");

    wait_for_positions(&gateway.sink, 1).await;
    let positions = gateway.sink.positions();
    assert_eq!(positions[0].device_id, "test-001");
    assert!((positions[0].latitude - 22.629_19).abs() < 1e-5);
    assert!((positions[0].speed - 11.112).abs() < 1e-9);

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn invalid_coordinate_drops_frame_but_keeps_session() {
    let config = ServerConfig {
        test_mode: true,
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    stream
        .write_all(b"*HQ,V1,test-002,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("auth");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");

    // 纬度越界：该帧被丢弃，无应答，会话保持
    stream
        .write_all(b"*HQ,V1,test-002,A,9237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("bad frame");

    // 会话仍接受后续有效帧
    stream
        .write_all(b"*HQ,V1,test-002,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("good frame");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");

    wait_for_positions(&gateway.sink, 1).await;
    assert_eq!(gateway.sink.len(), 1);

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn gt06_checksum_mismatch_closes_session() {
    let gateway = start_gateway(ServerConfig::default()).await;
    gateway
        .registry
        .register(DeviceRecord::new(GT06_UNIQUE_ID, "tracker-1"));

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    stream
        .write_all(&gt06_frame(0x01, &GT06_IMEI))
        .await
        .expect("login");
    let _ = read_some(&mut stream).await;

    let mut bad = gt06_frame(0x12, &gt06_location_payload());
    let pos = bad.len() - 4;
    bad[pos] = 0xFF;
    bad[pos + 1] = 0xFF;
    stream.write_all(&bad).await.expect("bad frame");

    read_eof(&mut stream).await;
    assert!(gateway.sink.is_empty());

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn teltonika_positions_keep_frame_order() {
    let gateway = start_gateway(ServerConfig::default()).await;
    // Teltonika 以首帧前 8 字节的十六进制作为设备标识
    let first = teltonika_frame(10.0, 20.0);
    let unique_id: String = first[..8].iter().map(|b| format!("{b:02x}")).collect();
    gateway
        .registry
        .register(DeviceRecord::new(unique_id.clone(), "tracker-t"));

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    stream.write_all(&first).await.expect("auth frame");
    assert_eq!(read_some(&mut stream).await, vec![0x01]);

    for latitude in [30.0, 40.0, 50.0] {
        stream
            .write_all(&teltonika_frame(latitude, -120.0))
            .await
            .expect("location");
        // 应答在读下一帧前写回，也避免帧在 TCP 层粘连
        assert_eq!(read_some(&mut stream).await, vec![0x01]);
    }

    wait_for_positions(&gateway.sink, 3).await;
    let latitudes: Vec<f64> = gateway
        .sink
        .positions()
        .iter()
        .map(|p| p.latitude)
        .collect();
    assert_eq!(latitudes, vec![30.0, 40.0, 50.0]);

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn duplicate_device_newest_connection_wins() {
    let config = ServerConfig {
        test_mode: true,
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let auth = b"*HQ,V1,test-dup,A,2237.7514,N,11408.6214,E,6,2,151022,10#";

    let mut first = TcpStream::connect(gateway.addr).await.expect("connect 1");
    first.write_all(auth).await.expect("auth 1");
    assert_eq!(read_some(&mut first).await, b"*HQ,OK#");

    let mut second = TcpStream::connect(gateway.addr).await.expect("connect 2");
    second.write_all(auth).await.expect("auth 2");
    assert_eq!(read_some(&mut second).await, b"*HQ,OK#");

    // 旧连接被服务端关闭，索引里只剩新会话
    read_eof(&mut first).await;
    assert_eq!(gateway.index.len(), 1);

    // 新连接继续工作
    second
        .write_all(b"*HQ,V1,test-dup,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("location");
    assert_eq!(read_some(&mut second).await, b"*HQ,OK#");
    wait_for_positions(&gateway.sink, 1).await;

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn oversized_frame_closes_session() {
    let config = ServerConfig {
        max_frame_bytes: 32,
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    // H02 前缀但永远不出现结束符：缓冲一超限就断开
    let mut junk = b"*HQ,V1,".to_vec();
    junk.extend(std::iter::repeat_n(b'9', 40));
    stream.write_all(&junk).await.expect("write junk");

    read_eof(&mut stream).await;
    assert!(gateway.index.is_empty());

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn idle_session_times_out() {
    let config = ServerConfig {
        idle_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    // 不发任何字节，等待服务端按空闲超时关闭
    read_eof(&mut stream).await;

    let _ = gateway.shutdown.send(true);
}

#[tokio::test]
async fn shutdown_closes_active_sessions() {
    let config = ServerConfig {
        test_mode: true,
        ..ServerConfig::default()
    };
    let gateway = start_gateway(config).await;

    let mut stream = TcpStream::connect(gateway.addr).await.expect("connect");
    stream
        .write_all(b"*HQ,V1,test-shut,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("auth");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");

    let _ = gateway.shutdown.send(true);
    // 在线会话观察到停机信号后由服务端关闭
    read_eof(&mut stream).await;
}

struct FailingSink;

#[async_trait::async_trait]
impl geotrack_storage::PositionSink for FailingSink {
    async fn publish(
        &self,
        _position: domain::Position,
    ) -> Result<(), geotrack_storage::StorageError> {
        Err(geotrack_storage::StorageError::new("forced failure"))
    }
}

#[tokio::test]
async fn sink_failures_do_not_break_session() {
    let config = ServerConfig {
        tcp_port: 0,
        test_mode: true,
        ..ServerConfig::default()
    };
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let listener = Listener::bind(config, registry, Arc::new(FailingSink))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(listener.run(rx));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"*HQ,V1,test-sink,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
        .await
        .expect("auth");
    assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");

    // 投递失败只计数丢弃，应答照常回写
    for _ in 0..2 {
        stream
            .write_all(b"*HQ,V1,test-sink,A,2237.7514,N,11408.6214,E,6,2,151022,10#")
            .await
            .expect("location");
        assert_eq!(read_some(&mut stream).await, b"*HQ,OK#");
    }

    let _ = shutdown.send(true);
}

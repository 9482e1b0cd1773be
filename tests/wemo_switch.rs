use heat_ctrl::domain::SwitchState;
use heat_ctrl::hardware::{
    Switch, SwitchConfig, SwitchError, SwitchFactory, WemoDiscovery, WemoSwitch,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTROL: &str = "/upnp/control/basicevent1";

fn soap_action(action: &str) -> String {
    format!("\"urn:Belkin:service:basicevent:1#{action}\"")
}

fn state_body(value: &str) -> String {
    format!(
        "<s:Envelope><s:Body><u:GetBinaryStateResponse xmlns:u=\"urn:Belkin:service:basicevent:1\">\
         <BinaryState>{value}</BinaryState></u:GetBinaryStateResponse></s:Body></s:Envelope>"
    )
}

fn switch_for(server: &MockServer) -> WemoSwitch {
    let addr = server.address();
    WemoSwitch::new(&addr.ip().to_string(), addr.port(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_forced_read_bypasses_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CONTROL))
        .and(header("SOAPACTION", soap_action("GetBinaryState").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(state_body("1")))
        .expect(2)
        .mount(&server)
        .await;

    let switch = switch_for(&server);
    assert_eq!(switch.get_state(true).await.unwrap(), SwitchState::On);
    // Served from cache
    assert_eq!(switch.get_state(false).await.unwrap(), SwitchState::On);
    assert_eq!(switch.get_state(true).await.unwrap(), SwitchState::On);
}

#[tokio::test]
async fn test_off_sends_set_binary_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CONTROL))
        .and(header("SOAPACTION", soap_action("SetBinaryState").as_str()))
        .and(body_string_contains("<BinaryState>0</BinaryState>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(state_body("0")))
        .expect(1)
        .mount(&server)
        .await;

    let switch = switch_for(&server);
    switch.off().await.unwrap();
    assert_eq!(switch.get_state(false).await.unwrap(), SwitchState::Off);
}

#[tokio::test]
async fn test_http_error_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let switch = switch_for(&server);
    assert!(matches!(switch.on().await, Err(SwitchError::Protocol(_))));
    assert!(matches!(
        switch.get_state(true).await,
        Err(SwitchError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_unreachable_plug_is_communication_error() {
    let switch = WemoSwitch::new("127.0.0.1", 9, Duration::from_secs(1)).unwrap();
    assert!(matches!(
        switch.get_state(true).await,
        Err(SwitchError::Communication(_))
    ));
}

fn setup_xml(name: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><root xmlns=\"urn:Belkin:device-1-0\"><device>\
         <deviceType>urn:Belkin:device:controllee:1</deviceType>\
         <friendlyName>{name}</friendlyName></device></root>"
    )
}

/// Answers every M-SEARCH with the given setup.xml locations, one reply each.
async fn ssdp_responder(locations: Vec<String>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            if !request.starts_with("M-SEARCH") {
                continue;
            }
            for location in &locations {
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nLOCATION: {location}\r\nST: urn:Belkin:service:basicevent:1\r\n\r\n"
                );
                let _ = socket.send_to(reply.as_bytes(), from).await;
            }
        }
    });
    addr
}

fn by_name(friendly_name: Option<&str>) -> SwitchConfig {
    SwitchConfig::Wemo {
        host: None,
        friendly_name: friendly_name.map(str::to_string),
        port: 49153,
        timeout_seconds: 2,
    }
}

#[tokio::test]
async fn test_discovered_plug_is_driven() {
    let lounge = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/setup.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(setup_xml("Lounge")))
        .mount(&lounge)
        .await;

    let girls = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/setup.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(setup_xml("Girlsbed")))
        .mount(&girls)
        .await;
    Mock::given(method("POST"))
        .and(path(CONTROL))
        .and(header("SOAPACTION", soap_action("GetBinaryState").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(state_body("0")))
        .expect(1)
        .mount(&girls)
        .await;

    let target = ssdp_responder(vec![
        format!("{}/setup.xml", lounge.uri()),
        format!("{}/setup.xml", girls.uri()),
    ])
    .await;
    let discovery = WemoDiscovery::new(target, Duration::from_millis(500)).unwrap();
    let mut factory = SwitchFactory::with_discovery(discovery);

    // Room name matched against the friendly name, ignoring case
    let switch = factory.create("girlsbed", &by_name(None)).await.unwrap();
    assert_eq!(switch.get_state(true).await.unwrap(), SwitchState::Off);
}

#[tokio::test]
async fn test_friendly_name_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/setup.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(setup_xml("Main Bedroom")))
        .mount(&server)
        .await;

    let target = ssdp_responder(vec![format!("{}/setup.xml", server.uri())]).await;
    let discovery = WemoDiscovery::new(target, Duration::from_millis(500)).unwrap();
    let mut factory = SwitchFactory::with_discovery(discovery);

    assert!(factory
        .create("masterbed", &by_name(Some("main bedroom")))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_missing_plug_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/setup.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(setup_xml("Lounge")))
        .expect(1)
        .mount(&server)
        .await;

    let target = ssdp_responder(vec![format!("{}/setup.xml", server.uri())]).await;
    let discovery = WemoDiscovery::new(target, Duration::from_millis(500)).unwrap();
    let mut factory = SwitchFactory::with_discovery(discovery);

    let err = factory.create("kitchen", &by_name(None)).await.err().unwrap();
    assert_eq!(err, SwitchError::NotFound("kitchen".to_string()));
}

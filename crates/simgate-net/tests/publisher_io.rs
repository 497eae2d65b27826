//! Transport-level tests of the publishers over loopback sockets.

use simgate_engine::event::{EventListener, StaticEvent};
use simgate_net::publisher::{Asn1TcpPublisher, Asn1UdpPublisher};
use simgate_types::channel::TransmissionChannel;
use simgate_types::config::ConfigTree;
use simgate_types::port::{PortId, VarType};
use simgate_types::variable::{Value, Variable};
use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::time::Duration;

fn make_channel(addr: &str, ports: &[(VarType, Option<&str>)]) -> TransmissionChannel {
    let mut tree = ConfigTree::new();
    tree.set("addr", addr).unwrap();
    let mut channel = TransmissionChannel::new("out.0", tree);
    for (num, (ty, encoding)) in ports.iter().enumerate() {
        let mut port_config = ConfigTree::new();
        if let Some(enc) = encoding {
            port_config.set("encoding", *enc).unwrap();
        }
        channel.push_port(PortId::new(*ty, num as u32), port_config);
    }
    channel
}

#[test]
fn udp_frames_carry_the_buffered_channel_state() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let addr = receiver.local_addr().unwrap().to_string();

    let channel = make_channel(
        &addr,
        &[(VarType::Real, Some("REAL")), (VarType::Integer, None)],
    );
    let mut publisher = Asn1UdpPublisher::connect(&channel, &channel.scoped_config()).unwrap();

    let mut ev = StaticEvent::new(
        0.1,
        vec![Variable::new(
            PortId::new(VarType::Real, 0),
            Value::Real(0.3),
        )],
    );
    publisher.event_triggered(&mut ev).unwrap();

    let mut datagram = [0u8; 64];
    let n = receiver.recv(&mut datagram).unwrap();
    // The untouched integer port ships its buffered zero.
    assert_eq!(
        &datagram[..n],
        [0x4a, 0x3e, 0x99, 0x99, 0x9a, 0x44, 0, 0, 0, 0]
    );
}

#[test]
fn events_without_channel_variables_send_nothing() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_millis(150)))
        .unwrap();
    let addr = receiver.local_addr().unwrap().to_string();

    let channel = make_channel(&addr, &[(VarType::Boolean, None)]);
    let mut publisher = Asn1UdpPublisher::connect(&channel, &channel.scoped_config()).unwrap();

    let mut ev = StaticEvent::new(
        0.1,
        vec![Variable::new(
            PortId::new(VarType::Real, 9),
            Value::Real(1.0),
        )],
    );
    publisher.event_triggered(&mut ev).unwrap();

    let mut datagram = [0u8; 16];
    assert!(receiver.recv(&mut datagram).is_err(), "no frame expected");
}

#[test]
fn tcp_frames_are_written_in_full() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let channel = make_channel(&addr, &[(VarType::String, None)]);
    let mut publisher = Asn1TcpPublisher::connect(&channel, &channel.scoped_config()).unwrap();
    let (mut server, _) = listener.accept().unwrap();

    let mut ev = StaticEvent::new(
        0.1,
        vec![Variable::new(
            PortId::new(VarType::String, 0),
            Value::Text("Hi!".into()),
        )],
    );
    publisher.event_triggered(&mut ev).unwrap();

    let mut bytes = [0u8; 6];
    server.read_exact(&mut bytes).unwrap();
    assert_eq!(bytes, [0x50, 0x00, 0x03, b'H', b'i', b'!']);

    // A second event with the same value still re-sends the frame: the
    // channel was touched.
    let mut again = StaticEvent::new(
        0.2,
        vec![Variable::new(
            PortId::new(VarType::String, 0),
            Value::Text("Hi!".into()),
        )],
    );
    publisher.event_triggered(&mut again).unwrap();
    server.read_exact(&mut bytes).unwrap();
    assert_eq!(bytes, [0x50, 0x00, 0x03, b'H', b'i', b'!']);
}

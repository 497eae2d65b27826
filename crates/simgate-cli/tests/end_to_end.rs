//! Black-box tests of the simgate binary: a full network loop with an
//! injected input and a published output, plus the documented exit codes.

use std::io::Write;
use std::net::{TcpListener, UdpSocket};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

fn binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_simgate"));
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd
}

fn wait_with_timeout(mut child: Child, limit: Duration) -> Option<i32> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status") {
            return status.code();
        }
        if started.elapsed() > limit {
            let _ = child.kill();
            let _ = child.wait();
            panic!("the binary did not terminate within {limit:?}");
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn full_loop_over_the_network() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
    udp.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let in_addr = listener.local_addr().unwrap();
    let out_addr = udp.local_addr().unwrap();

    let child = binary()
        .args([
            "app.lookAheadTime=0.4",
            "app.lookAheadStepSize=0.05",
            "app.stopTime=0.5",
            &format!("in.0.addr={in_addr}"),
            "in.0.protocol=CompactASN.1-TCP",
            "in.0.0=u",
            "in.0.0.type=0",
            &format!("out.0.addr={out_addr}"),
            "out.0.protocol=CompactASN.1-UDP",
            "out.0.0=y",
            "out.0.0.type=0",
        ])
        .spawn()
        .unwrap();

    // The subscriber connects during initialization.
    let (mut input, _) = listener.accept().unwrap();

    // Inject u = 1.0 as an LREAL value.
    let mut frame = vec![0x4b];
    frame.extend_from_slice(&1.0f64.to_bits().to_be_bytes());
    input.write_all(&frame).unwrap();

    // The publisher ships LREAL frames of the model output.
    let mut datagram = [0u8; 64];
    let n = udp.recv(&mut datagram).unwrap();
    assert_eq!(n, 9, "one LREAL value per frame");
    assert_eq!(datagram[0], 0x4b);

    assert_eq!(wait_with_timeout(child, Duration::from_secs(15)), Some(0));
}

#[test]
fn configuration_errors_exit_with_code_2() {
    let child = binary().arg("app.lookAheadTime=soon").spawn().unwrap();
    assert_eq!(wait_with_timeout(child, Duration::from_secs(15)), Some(2));

    // A missing look-ahead horizon is a configuration error as well.
    let child = binary().arg("app.stopTime=1.0").spawn().unwrap();
    assert_eq!(wait_with_timeout(child, Duration::from_secs(15)), Some(2));
}

#[test]
fn invalid_arguments_exit_with_code_1() {
    let child = binary().arg("justakey").spawn().unwrap();
    assert_eq!(wait_with_timeout(child, Duration::from_secs(15)), Some(1));

    let child = binary()
        .args(["app.lookAheadTime=0.1", "app.lookAheadTime=0.2"])
        .spawn()
        .unwrap();
    assert_eq!(wait_with_timeout(child, Duration::from_secs(15)), Some(1));
}

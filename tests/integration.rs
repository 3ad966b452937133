//! End-to-end scenarios driving a client endpoint and a server endpoint
//! across a real loopback TCP socket pair, standing in for the overlay
//! channel: three-way handshake, small and segmented transfers,
//! loss-induced retransmission, a duplicated SYN arriving after connection,
//! and teardown.

use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use srt::channel::tcp_duplex;
use srt::client::ClientEndpoint;
use srt::segment::{send_segment, SegmentHeader, SegmentType};
use srt::server::ServerEndpoint;
use srt::Config;

/// Overlay channel plus a spare writer clone onto the client's half, so a
/// test can inject a raw segment as if it came from the client's own
/// transport software without going through `ClientEndpoint`'s API.
struct Overlay {
    client: ClientEndpoint<TcpStream>,
    server: ServerEndpoint<TcpStream>,
    raw_client_writer: TcpStream,
}

fn overlay_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

fn endpoints(cfg: Config) -> Overlay {
    let (client_stream, server_stream) = overlay_pair();
    let raw_client_writer = client_stream.try_clone().unwrap();

    let (client_reader, client_writer) = tcp_duplex(client_stream).unwrap();
    let (server_reader, server_writer) = tcp_duplex(server_stream).unwrap();

    let client = ClientEndpoint::init(client_reader, client_writer, cfg).unwrap();
    let server = ServerEndpoint::init(server_reader, server_writer, cfg).unwrap();

    Overlay {
        client,
        server,
        raw_client_writer,
    }
}

fn connect(overlay: &Overlay, client_port: u16, server_port: u16) -> (usize, usize) {
    let server_sock = overlay.server.sock(server_port).unwrap();
    let client_sock = overlay.client.sock(client_port).unwrap();

    thread::scope(|scope| {
        let accept_handle = scope.spawn(|| overlay.server.accept(server_sock).unwrap());
        overlay.client.connect(client_sock, server_port).unwrap();
        accept_handle.join().unwrap();
    });

    (client_sock, server_sock)
}

#[test]
fn s1_three_way_handshake_reaches_connected_on_both_sides() {
    let overlay = endpoints(Config::default());
    let (client_sock, server_sock) = connect(&overlay, 7000, 9000);

    // A zero-risk way to confirm both sides are actually CONNECTED (and not
    // just locally believing so) is to push a byte through and read it back.
    overlay.client.send(client_sock, b"hi").unwrap();
    let mut buf = [0u8; 2];
    overlay.server.recv(server_sock, &mut buf).unwrap();
    assert_eq!(&buf, b"hi");
}

#[test]
fn s2_tiny_send_is_delivered_and_acked() {
    let overlay = endpoints(Config::default());
    let (client_sock, server_sock) = connect(&overlay, 7001, 9001);

    overlay.client.send(client_sock, b"hello").unwrap();

    let mut buf = [0u8; 5];
    overlay.server.recv(server_sock, &mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    overlay.client.disconnect(client_sock).unwrap();
    overlay.server.close(server_sock).unwrap();
    overlay.client.close(client_sock).unwrap();
}

#[test]
fn s3_send_larger_than_max_seg_len_is_reassembled_in_order() {
    let cfg = Config {
        max_seg_len: 3,
        gbn_window: 2,
        ..Config::default()
    };
    let overlay = endpoints(cfg);
    let (client_sock, server_sock) = connect(&overlay, 7002, 9002);

    let payload = b"the quick brown fox jumps";
    overlay.client.send(client_sock, payload).unwrap();

    let mut buf = vec![0u8; payload.len()];
    overlay.server.recv(server_sock, &mut buf).unwrap();
    assert_eq!(&buf, payload);

    overlay.client.disconnect(client_sock).unwrap();
    overlay.server.close(server_sock).unwrap();
    overlay.client.close(client_sock).unwrap();
}

#[test]
fn s4_delivery_survives_induced_loss_and_corruption() {
    let cfg = Config {
        max_seg_len: 4,
        gbn_window: 3,
        data_timeout: Duration::from_millis(20),
        sendbuf_polling_interval: Duration::from_millis(10),
        pkt_loss_rate: 0.35,
        ..Config::default()
    };
    let overlay = endpoints(cfg);
    let (client_sock, server_sock) = connect(&overlay, 7003, 9003);

    let payload: Vec<u8> = (0..64u8).collect();
    overlay.client.send(client_sock, &payload).unwrap();

    let mut buf = vec![0u8; payload.len()];
    overlay.server.recv(server_sock, &mut buf).unwrap();
    assert_eq!(buf, payload);

    overlay.client.disconnect(client_sock).unwrap();
    overlay.server.close(server_sock).unwrap();
    overlay.client.close(client_sock).unwrap();
}

#[test]
fn s5_duplicate_syn_after_connection_does_not_disturb_the_stream() {
    let mut overlay = endpoints(Config::default());
    let (client_sock, server_sock) = connect(&overlay, 7004, 9004);

    // Re-send a raw SYN as if the client's first SYNACK had been lost and a
    // retry crossed the already-completed handshake. The server should stay
    // CONNECTED and simply answer with another SYNACK; it must not disturb
    // `expect_seq` or the data already in flight.
    let duplicate_syn = SegmentHeader {
        src_port: 7004,
        dest_port: 9004,
        seq_num: 0,
        ack_num: 0,
        length: 0,
        checksum: 0,
        segment_type: SegmentType::Syn,
    };
    send_segment(&mut overlay.raw_client_writer, duplicate_syn, &[]).unwrap();

    overlay.client.send(client_sock, b"still fine").unwrap();
    let mut buf = [0u8; 10];
    overlay.server.recv(server_sock, &mut buf).unwrap();
    assert_eq!(&buf, b"still fine");

    overlay.client.disconnect(client_sock).unwrap();
    overlay.server.close(server_sock).unwrap();
    overlay.client.close(client_sock).unwrap();
}

#[test]
fn s6_teardown_frees_both_sockets_for_reuse() {
    let overlay = endpoints(Config::default());
    let (client_sock, server_sock) = connect(&overlay, 7005, 9005);

    overlay.client.disconnect(client_sock).unwrap();
    overlay.server.close(server_sock).unwrap();
    overlay.client.close(client_sock).unwrap();

    // the freed slots must be reusable
    let reused_client_sock = overlay.client.sock(7006).unwrap();
    let reused_server_sock = overlay.server.sock(9006).unwrap();
    assert_eq!(reused_client_sock, client_sock);
    assert_eq!(reused_server_sock, server_sock);
}

use std::net::TcpListener;

use srt::channel::tcp_duplex;
use srt::server::ServerEndpoint;
use srt::Config;

fn main() {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:9090").expect("bind overlay channel");
    println!(">>> waiting for overlay connection...");
    let (stream, _addr) = listener.accept().expect("accept overlay connection");

    let (reader, writer) = tcp_duplex(stream).expect("split overlay channel");
    let endpoint = ServerEndpoint::init(reader, writer, Config::default()).expect("init server endpoint");

    let sock = endpoint.sock(9000).expect("allocate socket");
    endpoint.accept(sock).expect("accept");
    println!(">>> connection accepted");

    let mut buf = [0u8; 64];
    loop {
        if endpoint.recv(sock, &mut buf).is_err() {
            break;
        }
        print!("{}", String::from_utf8_lossy(&buf));
    }

    endpoint.close(sock).expect("close");
}

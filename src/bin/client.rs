use std::io::{self, BufRead};

use srt::channel::tcp_connect;
use srt::client::ClientEndpoint;
use srt::Config;

fn main() {
    env_logger::init();

    let (reader, writer) = tcp_connect("127.0.0.1:9090").expect("dial overlay channel");
    let endpoint = ClientEndpoint::init(reader, writer, Config::default()).expect("init client endpoint");

    let sock = endpoint.sock(7000).expect("allocate socket");
    endpoint.connect(sock, 9000).expect("connect");
    println!(">>> connected");

    for line in io::stdin().lock().lines() {
        let line = line.expect("read stdin");
        if line.is_empty() {
            break;
        }
        endpoint.send(sock, line.as_bytes()).expect("send");
    }

    endpoint.disconnect(sock).expect("disconnect");
    endpoint.close(sock).expect("close");
}

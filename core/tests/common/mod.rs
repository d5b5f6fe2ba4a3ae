//! Shared setup for tests that talk to the live mock server.

use std::net::SocketAddr;

/// Start the mock server on a random port on its own runtime thread and
/// return its address. The server lives until the test binary exits.
pub fn start_mock_server() -> SocketAddr {
    end2end::trace::init();

    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

//! C8: process entry. Mirrors the original `page.c`'s `main()`: bind,
//! install signal handling, run the loop, translate bind failure to exit 1.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};

use sketchboard::config::{BACKLOG, PORT};
use sketchboard::Server;

fn bind_dual_stack(port: u16) -> std::io::Result<StdTcpListener> {
    let addr: SocketAddr = format!("[::]:{port}").parse().expect("valid address");
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&shutdown)) {
            tracing::warn!(error = %e, signal = sig, "failed to install signal handler");
        }
    }

    let listener = match bind_dual_stack(PORT) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port = PORT, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(port = PORT, "bound.");

    let mut server = match Server::new(listener, shutdown) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "event loop exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

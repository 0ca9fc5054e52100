use alvr_server::session::HostSession;
use std::net::IpAddr;
use std::time::Duration;

/// Host-monotonic nanoseconds since `start`, the clock every timestamp
/// fed into `clock.rs`/`pose.rs` is measured against (spec §4.3: "all
/// times inside host subsystems are host-monotonic nanoseconds").
fn now_ns(start: tokio::time::Instant) -> i64 {
    start.elapsed().as_nanos() as i64
}

#[tokio::main]
async fn main() {
    if let Err(e) = alvr_server::logging::init(std::env::var("ALVR_VERBOSE").is_ok()) {
        eprintln!("failed to initialize logging: {e}");
    }

    let peer: IpAddr = match std::env::args().nth(1) {
        Some(arg) => match arg.parse() {
            Ok(ip) => ip,
            Err(e) => {
                log::error!("invalid headset address {arg}: {e}");
                return;
            }
        },
        None => {
            log::error!("usage: alvr_server <headset-ip>");
            return;
        }
    };

    let period_ns = (1.0e9 / 90.0) as i64;
    let mut session = match HostSession::connect(peer, period_ns, 2).await {
        Ok(session) => session,
        Err(e) => {
            log::error!("failed to establish session with {peer}: {e}");
            return;
        }
    };
    log::info!("session established with {peer}");

    let start = tokio::time::Instant::now();
    let mut last_tick = tokio::time::Instant::now();
    loop {
        match session.poll_control().await {
            Ok(Some(packet)) => log::debug!("control packet: {packet:?}"),
            Ok(None) => {}
            Err(e) => {
                log::error!("control channel error: {e}");
                break;
            }
        }

        if let Err(e) = session.poll_stream(now_ns(start)).await {
            log::warn!("stream poll error: {e}");
        }

        if last_tick.elapsed() >= Duration::from_secs(1) {
            last_tick = tokio::time::Instant::now();
            if let Err(e) = session.worker_tick(now_ns(start), period_ns).await {
                log::warn!("worker tick error: {e}");
            }
        }
    }
}

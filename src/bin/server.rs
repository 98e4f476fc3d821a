use compdetect_core::config::DEFAULT_PREPROBE_PORT;
use compdetect_transport::ProbeServer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let port = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u16>()?,
        None => DEFAULT_PREPROBE_PORT,
    };

    let server = ProbeServer::bind_any(port)?;
    tracing::info!("Waiting for a client on {}", server.local_addr()?);
    let report = server.run()?;
    println!("{}", report.result.verdict().message());
    Ok(())
}

use compdetect_core::ProbeConfig;
use compdetect_transport::{ProbeClient, Schedule};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: compdetect-client <config.json|config.toml>");
        std::process::exit(1);
    };

    let config = ProbeConfig::from_file(&path)?;
    tracing::info!(
        "Probing {} (l={}, n={}, gamma={}s)",
        config.server_ip_addr,
        config.l,
        config.n,
        config.gamma
    );

    let verdict = ProbeClient::new(config, Schedule::default()).run()?;
    println!("{}", verdict.message());
    Ok(())
}

use clap::Parser;
mod args;
mod logger;
use anyhow::Result;
use ping::{RawSocketFactory, Session};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = args::Opts::parse();
    logger::init(args.verbose);

    let target = ping::resolve(&args.host).await?;

    // The handler only requests the stop, the session loop reports
    let stop = CancellationToken::new();
    let stopper = stop.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            stopper.cancel();
        }
    });

    let factory = RawSocketFactory::new(args.iface.clone());
    let mut session = Session::new(target, args.session_config(), factory);
    session.run(&stop, &mut std::io::stdout()).await?;
    Ok(())
}

//! Serve command - expose the game library to download clients.

use std::net::SocketAddr;
use std::path::PathBuf;

use frost::server::TransferServer;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub listen: Option<String>,
    pub library: Option<PathBuf>,
    pub no_backfill: bool,
    pub verbose: bool,
}

/// Run the serve command until Ctrl+C.
pub fn run(args: ServeArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.verbose)?;
    runner.log_startup("serve");

    let mut config = runner.config().clone();
    if let Some(library) = args.library {
        config.server.library_root = Some(library);
    }
    let mut server_config = config.server_config().map_err(|e| {
        CliError::Config(format!(
            "{}. Set server.library_root with 'frost config set' or use --library.",
            e
        ))
    })?;
    if let Some(listen) = args.listen {
        let addr: SocketAddr = listen
            .parse()
            .map_err(|e| CliError::Config(format!("Invalid listen address '{}': {}", listen, e)))?;
        server_config = server_config.with_listen(addr);
    }
    server_config = server_config.with_backfill_on_start(!args.no_backfill);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping server...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    runtime.block_on(async {
        let server = TransferServer::bind(&server_config).await?;

        println!("Frost Server v{}", frost::VERSION);
        println!("=================");
        println!();
        println!("Library:   {}", server_config.library_root.display());
        println!("Manifests: {}", server_config.manifest_db.display());
        println!(
            "Endpoints: http://{}{}/{{meta,load}}",
            server.local_addr()?,
            server_config.base_path
        );
        println!();
        println!("Press Ctrl+C to stop");
        println!();

        server.run(shutdown).await
    })?;

    println!("Server stopped.");
    Ok(())
}

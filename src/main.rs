use std::{error::Error, sync::Arc};

use clap::Parser;
use classroom_quiz::{
    clock::SystemClock,
    config::{LifecycleConfig, Opt, SyncConfig},
    handlers::{code_generator::RandomCodes, connection_handler::handle_connection, AppContext},
    jwtoken::TokenKeys,
    loggers::file_logger::init_file_logger,
    store::{sqlite::SqliteStore, SessionStore},
};
use log::{error, info};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();
    init_file_logger(&opt.log_dir, opt.log_level)?;
    info!("App started!");

    let store = if opt.database == ":memory:" {
        SqliteStore::open_in_memory()?
    } else {
        SqliteStore::open(&opt.database)?
    };
    let store: Arc<dyn SessionStore> = Arc::new(store);

    let ctx = Arc::new(AppContext::new(
        store,
        Arc::new(SystemClock),
        Arc::new(RandomCodes),
        LifecycleConfig::from(&opt),
        SyncConfig::from(&opt.sync),
        TokenKeys::from_secret(&opt.token_secret),
    ));

    for path in &opt.imports {
        if let Err(err) = ctx.catalog.import_pack(path).await {
            error!("Could not import {}: {}", path.display(), err);
            return Err(err.into());
        }
    }

    let listener = TcpListener::bind(&opt.addr).await?;
    info!("Listening on: {}", opt.addr);

    while let Ok((stream, addr)) = listener.accept().await {
        tokio::spawn(handle_connection(ctx.clone(), stream, addr));
    }

    Ok(())
}

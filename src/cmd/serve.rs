//! Development backend command — `gigsync serve`.

use anyhow::Result;

use gigsync::config::GigsyncConfig;

pub async fn cmd_serve(config: &GigsyncConfig, port: Option<u16>, dev: bool) -> Result<()> {
    let port = port.unwrap_or(config.devserver.port);
    println!("Known gents: {}", config.devserver.gents.join(", "));
    gigsync::devserver::serve(port, config.devserver.gents.clone(), dev).await
}

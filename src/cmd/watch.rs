//! Live gig list — `gigsync watch`.

use std::sync::Arc;

use anyhow::Result;
use console::style;

use gigsync::config::GigsyncConfig;
use gigsync::gigs::Identity;
use gigsync::realtime::{ChannelStatus, RealtimeChannel};

use super::gigs::{client, print_gigs, sync_controller};

pub async fn cmd_watch(config: &GigsyncConfig, identity: Identity) -> Result<()> {
    let channel = RealtimeChannel::new(client(config)?.base_url().clone());
    let mut status_rx = channel.status();
    let controller = Arc::new(sync_controller(config, identity.clone())?.with_channel(channel));
    let mut view_rx = controller.subscribe();

    println!(
        "{} {} at {}",
        style("Watching gigs for").bold().cyan(),
        identity,
        config.server.base_url
    );
    match controller.bind(identity.clone()).await {
        Some(ChannelStatus::Open) => {}
        _ => println!(
            "  {} push channel unavailable, showing a single snapshot",
            style("⚠").yellow()
        ),
    }
    view_rx.mark_unchanged();
    render(&identity, &controller.snapshot());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                render(&identity, &view);
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                if status == ChannelStatus::Closed {
                    println!("  {} push channel closed", style("⚠").yellow());
                }
            }
        }
    }

    controller.unbind().await;
    println!("{}", style("Stopped watching.").dim());
    Ok(())
}

fn render(identity: &Identity, view: &gigsync::sync::GigsView) {
    println!();
    println!(
        "{} ({} gigs)",
        style(format!("Gigs for {}", identity)).bold(),
        view.gigs.len()
    );
    print_gigs(identity, &view.gigs);
    if let Some(error) = &view.error {
        println!("  {} {}", style("Error:").red().bold(), error);
    }
}

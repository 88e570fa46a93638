//! One-shot gig commands — `gigsync list|create|edit|assign|state`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use console::style;

use gigsync::config::GigsyncConfig;
use gigsync::gigs::{GigClient, GigPatch, GigSeed, Identity};
use gigsync::sync::{SaveOutcome, SyncController};

pub(crate) fn client(config: &GigsyncConfig) -> Result<GigClient> {
    GigClient::from_config(&config.server).context("Failed to build HTTP client")
}

pub(crate) fn sync_controller(config: &GigsyncConfig, scope: Identity) -> Result<SyncController> {
    let repo = Arc::new(client(config)?);
    Ok(SyncController::new(
        scope,
        repo,
        config.seed.placeholder_email.clone(),
    ))
}

pub async fn cmd_list(config: &GigsyncConfig, identity: Identity) -> Result<()> {
    let controller = sync_controller(config, identity.clone())?;
    controller
        .refresh()
        .await
        .with_context(|| format!("Failed to list gigs for {}", identity))?;
    print_gigs(&identity, &controller.snapshot().gigs);
    Ok(())
}

pub async fn cmd_create(
    config: &GigsyncConfig,
    date: Option<NaiveDate>,
    email: Option<String>,
    fee: Option<i64>,
) -> Result<()> {
    let mut seed = match date {
        Some(date) => GigSeed::placeholder(date, &config.seed.placeholder_email),
        None => GigSeed::for_today(&config.seed.placeholder_email),
    };
    if let Some(email) = email {
        seed.client_email = email;
    }
    if let Some(fee) = fee {
        seed.fee_cents = fee;
    }

    let controller = sync_controller(config, Identity::Manager)?;
    let gig = controller
        .create_with(seed)
        .await
        .context("Failed to create gig")?;
    println!("{} {}", style("Created").green().bold(), gig.id);
    print_gigs(&Identity::Manager, std::slice::from_ref(&gig));
    Ok(())
}

pub async fn cmd_edit(
    config: &GigsyncConfig,
    id: &str,
    identity: Identity,
    date: Option<NaiveDate>,
    email: Option<String>,
    fee: Option<i64>,
) -> Result<()> {
    let controller = sync_controller(config, identity.clone())?;
    controller
        .refresh()
        .await
        .with_context(|| format!("Failed to load gigs for {}", identity))?;

    if controller.open(id).selection.is_none() {
        bail!("Gig {} is not in the {} list", id, identity);
    }
    controller.begin_edit(id)?;

    let edits = GigPatch {
        date,
        client_email: email,
        fee_cents: fee,
    };
    match controller.save(id, &edits).await {
        Ok(SaveOutcome::Saved(gig)) => {
            println!("{} {}", style("Saved").green().bold(), gig.id);
            print_gigs(&identity, std::slice::from_ref(&gig));
        }
        Ok(SaveOutcome::Unchanged) => {
            println!("{}", style("No changes to save.").dim());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to save gig {}", id)),
    }
    Ok(())
}

pub async fn cmd_assign(config: &GigsyncConfig, gig: &str, gent: &str, assigned: bool) -> Result<()> {
    let assignment = client(config)?
        .assign_gent(gig, gent, assigned)
        .await
        .with_context(|| format!("Failed to update assignment of {} on {}", gent, gig))?;
    let verb = if assigned { "Assigned" } else { "Unassigned" };
    println!("{} {} → {}", style(verb).green().bold(), gent, assignment.id);
    if assignment.gents.is_empty() {
        println!("  gents: {}", style("(none)").dim());
    } else {
        println!("  gents: {}", assignment.gents.join(", "));
    }
    Ok(())
}

pub async fn cmd_state(config: &GigsyncConfig, gent: &str) -> Result<()> {
    let state = client(config)?
        .gent_state(gent)
        .await
        .with_context(|| format!("Failed to fetch state for {}", gent))?;
    if state.red {
        println!("{} {}", gent, style("red (has assigned gigs)").red().bold());
    } else {
        println!("{} {}", gent, style("clear").green());
    }
    Ok(())
}

pub(crate) fn print_gigs(identity: &Identity, gigs: &[gigsync::gigs::Gig]) {
    if gigs.is_empty() {
        println!("{}", style("No gigs.").dim());
        return;
    }
    for gig in gigs {
        let mut line = format!(
            "{}  {}  {:<28} {:>10}",
            style(&gig.id).cyan(),
            gig.date,
            gig.client_email,
            format_fee(gig.fee_cents)
        );
        if identity.is_manager() {
            let gents = gig.assigned_gents.as_deref().unwrap_or_default();
            if gents.is_empty() {
                line.push_str(&format!("  {}", style("unassigned").dim()));
            } else {
                line.push_str(&format!("  {}", gents.join(", ")));
            }
        }
        println!("{}", line);
    }
}

/// Render integer cents as dollars, e.g. `-1205` → `-$12.05`.
pub(crate) fn format_fee(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

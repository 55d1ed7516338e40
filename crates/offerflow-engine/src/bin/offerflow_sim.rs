//! Offerflow traffic simulator
//!
//! Seeds a catalog and event calendar, drives concurrent synthetic traffic
//! through the engine, and logs the resulting KPI report.

use std::sync::Arc;

use anyhow::Result;
use offerflow_common::{
    day_of, DateRange, EventCode, EventWindow, Offer, SaleStatus, UrgencyLevel, MILLIS_PER_DAY,
    VERSION,
};
use offerflow_engine::{EngineConfig, OfferEngine};
use offerflow_ledger::ConversionEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONTENT_ITEMS: usize = 20;
const VISITS_PER_ITEM: usize = 200;
const KEYWORDS: [&str; 3] = ["audio", "camera", "kitchen"];

fn catalog() -> Vec<Offer> {
    vec![
        Offer::new("earbuds-pro", "amazon", 12_800, 300, 0.06)
            .with_title("Wireless earbuds")
            .with_category("audio")
            .with_link("https://example.com/earbuds-pro"),
        Offer::new("studio-mic", "rakuten", 18_000, 800, 0.03)
            .with_title("USB studio microphone")
            .with_category("audio")
            .with_keyword("podcast")
            .with_link("https://example.com/studio-mic"),
        Offer::new("mirrorless-kit", "amazon", 98_000, 200, 0.01)
            .with_title("Mirrorless camera kit")
            .with_category("camera")
            .with_link("https://example.com/mirrorless-kit"),
        Offer::new("action-cam", "rakuten", 32_000, 500, 0.025)
            .with_title("4K action camera")
            .with_category("camera")
            .with_link("https://example.com/action-cam"),
        Offer::new("air-fryer", "rakuten", 9_800, 1_000, 0.05)
            .with_title("Compact air fryer")
            .with_category("kitchen")
            .with_link("https://example.com/air-fryer"),
        Offer::new("knife-set", "amazon", 6_500, 1_200, 0.04)
            .with_title("Chef knife set")
            .with_category("kitchen")
            .with_link("https://example.com/knife-set"),
    ]
}

/// Ground-truth conversion rate the simulator uses for each offer
fn true_conversion_rate(offer_id: &str) -> f64 {
    match offer_id {
        "earbuds-pro" => 0.08,
        "studio-mic" => 0.02,
        "mirrorless-kit" => 0.015,
        "action-cam" => 0.04,
        "air-fryer" => 0.03,
        "knife-set" => 0.06,
        _ => 0.01,
    }
}

async fn drive_item(engine: Arc<OfferEngine>, item: usize, seed: u64) -> Result<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let content_item_id = format!("post-{}", item);
    let keyword = KEYWORDS[item % KEYWORDS.len()];
    let mut conversions = 0;

    for visit in 0..VISITS_PER_ITEM {
        let selection = match engine.select_offer(&content_item_id, Some(keyword)).await {
            Ok(selection) => selection,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        let Some(arm_id) = selection.arm_id() else {
            continue;
        };

        engine.record_impression(arm_id).await?;
        if !rng.gen_bool(0.3) {
            continue;
        }
        engine.record_click(arm_id, "blog").await?;

        if rng.gen_bool(true_conversion_rate(selection.offer_id())) {
            let amount = Decimal::from(rng.gen_range(3_000..50_000));
            let commission = (amount * Decimal::new(5, 2)).round();
            let order_id = format!("{}-{}", content_item_id, visit);
            let event = ConversionEvent::new(arm_id, amount, commission, "blog")
                .with_external_order_id(order_id.clone());

            engine.record_conversion(event.clone()).await?;
            // Networks redeliver webhooks
            if rng.gen_bool(0.2) {
                let replay = engine.record_conversion(event).await?;
                debug!(order_id = %order_id, duplicate = replay.is_duplicate(), "Replayed webhook");
            }

            let status = if rng.gen_bool(0.85) {
                SaleStatus::Confirmed
            } else {
                SaleStatus::Cancelled
            };
            engine.apply_sale_status_by_order(&order_id, status)?;
            conversions += 1;
        }
    }

    Ok(conversions)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Offerflow simulator v{}", VERSION);

    let config = EngineConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let engine = Arc::new(OfferEngine::new(config)?);
    let closer = engine.start_day_closer();

    let report = engine.refresh_offers(catalog());
    info!(accepted = report.accepted, rejected = report.rejected, "Catalog loaded");

    let now = chrono::Utc::now().timestamp_millis();
    engine.refresh_event_windows(vec![
        EventWindow::new(EventCode::MonthlySaleDay, now - 60_000, now + MILLIS_PER_DAY, 1.5)
            .with_scope("rakuten")
            .with_badge("Points x5 today", UrgencyLevel::High),
        EventWindow::new(EventCode::YearEnd, now + 7 * MILLIS_PER_DAY, now + 14 * MILLIS_PER_DAY, 1.2),
    ])?;

    let handles: Vec<_> = (0..CONTENT_ITEMS)
        .map(|item| {
            let engine = Arc::clone(&engine);
            tokio::spawn(drive_item(engine, item, item as u64))
        })
        .collect();

    let mut conversions = 0;
    for handle in handles {
        conversions += handle.await??;
    }
    info!(conversions, "Traffic complete");

    let today = day_of(chrono::Utc::now().timestamp_millis());
    let kpis = engine.get_kpis(DateRange::day(today), None).await?;
    info!(
        clicks = kpis.total_clicks,
        conversions = kpis.total_conversions,
        revenue = %kpis.total_revenue,
        conversion_rate = kpis.conversion_rate,
        epc = %kpis.epc,
        "KPI summary"
    );
    println!("{}", serde_json::to_string_pretty(&kpis)?);

    for window in engine.upcoming_events(30 * MILLIS_PER_DAY) {
        info!(code = %window.code, start_ts = window.start_ts, "Upcoming event");
    }

    closer.abort();
    Ok(())
}

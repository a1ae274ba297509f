//! Read-only operator reports rendered from the engine snapshot.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use common::{AssetView, Result};

pub const HELP: &str = "Commands:\n  \
     h      holdings with P/L %\n  \
     w      watching assets with distance to trigger\n  \
     t      armed signals\n  \
     f      dump a CSV snapshot\n  \
     <BASE> rows for one base currency (e.g. BTC)\n  \
     ?      this help";

fn price(view: &AssetView) -> String {
    view.last_price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "-".into())
}

fn pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:+.2}%"))
        .unwrap_or_else(|| "-".into())
}

fn line(out: &mut String, view: &AssetView, detail: &str) {
    let a = &view.asset;
    let _ = writeln!(
        out,
        "{:<14} {:<9} {:<8} price {:>12}  matrix {:>12.2}  {}  [{}]",
        a.name,
        a.pair.to_string(),
        a.state().to_string(),
        price(view),
        a.matrix_price,
        detail,
        view.temperature()
    );
}

pub fn holdings(views: &[AssetView]) -> String {
    let mut out = String::new();
    for view in views.iter().filter(|v| v.asset.holding) {
        line(&mut out, view, &format!("P/L {}", pct(view.pl_pct())));
    }
    if out.is_empty() {
        out.push_str("No holdings");
    }
    out
}

pub fn watching(views: &[AssetView]) -> String {
    let mut out = String::new();
    for view in views.iter().filter(|v| !v.asset.holding && v.asset.active) {
        line(
            &mut out,
            view,
            &format!(
                "trigger {:.2} ({} away)",
                view.asset.buy_trigger(),
                pct(view.distance_to_trigger_pct())
            ),
        );
    }
    if out.is_empty() {
        out.push_str("No watching assets");
    }
    out
}

pub fn armed(views: &[AssetView]) -> String {
    let mut out = String::new();
    for view in views.iter().filter(|v| v.asset.is_armed()) {
        line(&mut out, view, &format!("trail stop {:.2}", view.asset.trail_stop));
    }
    if out.is_empty() {
        out.push_str("No armed signals");
    }
    out
}

pub fn for_base(views: &[AssetView], base: &str) -> String {
    let mut out = String::new();
    for view in views.iter().filter(|v| v.asset.pair.base.eq_ignore_ascii_case(base)) {
        let detail = if view.asset.holding {
            format!("P/L {}", pct(view.pl_pct()))
        } else {
            format!("to trigger {}", pct(view.distance_to_trigger_pct()))
        };
        line(&mut out, view, &detail);
    }
    if out.is_empty() {
        out = format!("No assets for {base}");
    }
    out
}

/// One CSV row of a snapshot dump.
#[derive(Debug, Serialize)]
struct SnapshotRow<'a> {
    id: i64,
    name: &'a str,
    pair: String,
    state: String,
    active: bool,
    last_price: Option<f64>,
    matrix_price: f64,
    high_water: f64,
    low_water: f64,
    trigger: f64,
    buy_armed: bool,
    sell_armed: bool,
    trail_stop: f64,
    allocated_amount: f64,
    last_buy_price: f64,
    pl_pct: Option<f64>,
    distance_to_trigger_pct: Option<f64>,
    temperature: String,
    deal_count: i64,
    proceeds_strategy: String,
}

/// Write the snapshot to a timestamped CSV file under `dir` and return its path.
pub fn dump_csv(views: &[AssetView], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("snapshot_{}.csv", Utc::now().format("%Y%m%d_%H%M%S_%3f")));

    let mut writer = csv::Writer::from_path(&path)?;
    for view in views {
        let a = &view.asset;
        writer.serialize(SnapshotRow {
            id: a.id,
            name: &a.name,
            pair: a.pair.to_string(),
            state: a.state().to_string(),
            active: a.active,
            last_price: view.last_price,
            matrix_price: a.matrix_price,
            high_water: a.high_water,
            low_water: a.low_water,
            trigger: a.trigger(),
            buy_armed: a.buy_armed,
            sell_armed: a.sell_armed,
            trail_stop: a.trail_stop,
            allocated_amount: a.allocated_amount,
            last_buy_price: a.last_buy_price,
            pl_pct: view.pl_pct(),
            distance_to_trigger_pct: view.distance_to_trigger_pct(),
            temperature: view.temperature().to_string(),
            deal_count: a.deal_count,
            proceeds_strategy: a.proceeds_strategy.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Asset, AssetParams, ProceedsStrategy, TradingPair};

    fn view(name: &str, base: &str, holding: bool, last: f64) -> AssetView {
        let asset = Asset::new(AssetParams {
            id: 1,
            name: name.into(),
            pair: TradingPair::new(base, "EUR"),
            allocated_amount: 10.0,
            last_buy_price: if holding { 100.0 } else { 0.0 },
            matrix_price: 100.0,
            holding,
            high_water: 100.0,
            low_water: 100.0,
            gain: 0.03,
            trail: 0.01,
            deal_count: 0,
            last_update_time: None,
            cooldown_until: None,
            proceeds_strategy: ProceedsStrategy::Eur,
            proceeds_ratio: 0.5,
            active: true,
        });
        AssetView { asset, last_price: Some(last) }
    }

    #[test]
    fn holdings_show_pl() {
        let views = [view("btc-1", "BTC", true, 110.0), view("eth-1", "ETH", false, 99.0)];
        let out = holdings(&views);
        assert!(out.contains("btc-1"));
        assert!(out.contains("+10.00%"));
        assert!(!out.contains("eth-1"));
    }

    #[test]
    fn empty_reports_say_so() {
        let views = [view("eth-1", "ETH", false, 99.0)];
        assert_eq!(holdings(&views), "No holdings");
        assert_eq!(armed(&views), "No armed signals");
        assert_eq!(for_base(&views, "BTC"), "No assets for BTC");
    }

    #[test]
    fn armed_lists_only_armed_assets() {
        let mut v = view("btc-1", "BTC", false, 96.5);
        v.asset.buy_armed = true;
        v.asset.trail_stop = 96.96;
        let out = armed(&[v, view("eth-1", "ETH", false, 99.0)]);
        assert!(out.contains("btc-1"));
        assert!(out.contains("96.96"));
        assert!(!out.contains("eth-1"));
    }

    #[test]
    fn base_filter_is_case_insensitive() {
        let views = [view("btc-1", "BTC", false, 98.0), view("eth-1", "ETH", false, 99.0)];
        let out = for_base(&views, "btc");
        assert!(out.contains("btc-1") && !out.contains("eth-1"));
    }

    #[test]
    fn csv_dump_writes_one_row_per_asset() {
        let dir = tempfile::tempdir().unwrap();
        let views = [view("btc-1", "BTC", true, 110.0), view("eth-1", "ETH", false, 99.0)];
        let path = dump_csv(&views, dir.path()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "temperature"));
        assert_eq!(reader.records().count(), 2);
    }
}

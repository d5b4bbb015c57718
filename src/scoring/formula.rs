/// Point formulas
///
/// | Key | Points |
/// |---|---|
/// | `nft_collections` | 1-3 → 100, 4-9 → 200, 10+ → 300 |
/// | `token_holdings` | ceil(usd × 1.5) |
/// | `meme_coins` | ceil(usd × 1.2) |
/// | `wallet_age` | ≤30 → 100, ≤90 → 200, ≤180 → 300, ≤365 → 400, ≤730 → 500, else 600 |
/// | `total_transactions` | ≤100 → 100, ≤200 → 200, ≤400 → 300, ≤700 → 400, ≤900 → 500, else 600 |
/// | `bridge_in` / `bridge_out` | ceil(usd × 5) / ceil(usd × 4) |
/// | `gm` | count × 10 |
/// | `inkypump` | created × 50 + ceil((buy + sell) × 2) |
/// | `tydro` | ceil((supply + borrow) × 10) |
/// | `swap` | ceil(usd × 4) |
/// | `shellies` | played × 10 + staked × 100 + raffles × 25 |
/// | `zns` | deploy × 10 + gm × 5 + register × 100 |
/// | `nft2me` | collections × 25 + minted × 10 |
/// | `nft_trading` | Σ trades × venue weight |
/// | `marvk` | cards × 50 + ceil((lock + vest) × 1.5) |
/// | `perp_deposits` | ceil(deposits × 5 + volume × 0.1) |
/// | `nado` | ceil(accounts × 50 + volume × 2) |
///
/// A wallet age or transaction count of zero scores 0.

use crate::core::units::sanitize;
use crate::core::{CalculationMode, MetricType, PointsRule};
use crate::extractors::{
    ActivityCounts, BridgeVolume, DepositStats, LendingPosition, NftTradingStats, SwapVolume,
    TokenLaunchStats, VestingStats,
};
use crate::holdings::WalletStats;

use super::types::{NativeEntry, PlatformEntry, ScoreBreakdown};

/// Everything the formulas read for one wallet
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub stats: WalletStats,
    pub bridge: BridgeVolume,
    pub swap: SwapVolume,
    pub tydro: LendingPosition,
    pub gm: ActivityCounts,
    pub inkypump: TokenLaunchStats,
    pub shellies: ActivityCounts,
    pub zns: ActivityCounts,
    pub nft2me: ActivityCounts,
    pub nft_trading: NftTradingStats,
    pub marvk: VestingStats,
    pub perp_deposits: DepositStats,
    pub nado: DepositStats,
}

pub trait ScoreFormula: Send + Sync {
    fn score(&self, inputs: &ScoreInputs) -> ScoreBreakdown;
}

/// `ceil(value × rate)`, with non-finite or negative input scoring 0
pub fn ceil_points(value: f64, rate: f64) -> u64 {
    let product = sanitize(value) * sanitize(rate);
    if product <= 0.0 {
        return 0;
    }
    product.ceil() as u64
}

pub fn nft_collection_points(collections: u64) -> u64 {
    match collections {
        0 => 0,
        1..=3 => 100,
        4..=9 => 200,
        _ => 300,
    }
}

pub fn wallet_age_points(days: u64) -> u64 {
    match days {
        0 => 0,
        1..=30 => 100,
        31..=90 => 200,
        91..=180 => 300,
        181..=365 => 400,
        366..=730 => 500,
        _ => 600,
    }
}

pub fn total_tx_points(txns: u64) -> u64 {
    match txns {
        0 => 0,
        1..=100 => 100,
        101..=200 => 200,
        201..=400 => 300,
        401..=700 => 400,
        701..=900 => 500,
        _ => 600,
    }
}

/// Linear-multiplier formula family
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalFormula;

impl CanonicalFormula {
    fn native(breakdown: &mut ScoreBreakdown, key: &str, value: f64, points: u64) {
        breakdown.native.insert(key.to_string(), NativeEntry { value, points });
    }

    fn platform(breakdown: &mut ScoreBreakdown, key: &str, tx_count: u64, usd_volume: f64, points: u64) {
        breakdown.platforms.insert(
            key.to_string(),
            PlatformEntry {
                tx_count,
                usd_volume,
                points,
            },
        );
    }
}

impl ScoreFormula for CanonicalFormula {
    fn score(&self, inputs: &ScoreInputs) -> ScoreBreakdown {
        let mut b = ScoreBreakdown::default();
        let stats = &inputs.stats;

        let collections = stats.collections_held();
        Self::native(&mut b, "nft_collections", collections as f64, nft_collection_points(collections));
        Self::native(&mut b, "token_holdings", stats.token_holdings_usd, ceil_points(stats.token_holdings_usd, 1.5));
        Self::native(&mut b, "meme_coins", stats.meme_holdings_usd, ceil_points(stats.meme_holdings_usd, 1.2));
        Self::native(&mut b, "wallet_age", stats.age_days as f64, wallet_age_points(stats.age_days));
        Self::native(&mut b, "total_transactions", stats.total_txns as f64, total_tx_points(stats.total_txns));

        let bridge = &inputs.bridge;
        Self::platform(&mut b, "bridge_in", bridge.in_count, bridge.bridged_in_usd, ceil_points(bridge.bridged_in_usd, 5.0));
        Self::platform(&mut b, "bridge_out", bridge.out_count, bridge.bridged_out_usd, ceil_points(bridge.bridged_out_usd, 4.0));

        let gm = &inputs.gm;
        Self::platform(&mut b, "gm", gm.total, 0.0, gm.total.saturating_mul(10));

        let pump = &inputs.inkypump;
        let pump_volume = pump.buy_usd + pump.sell_usd;
        Self::platform(
            &mut b,
            "inkypump",
            pump.tx_count,
            pump_volume,
            pump.tokens_created * 50 + ceil_points(pump_volume, 2.0),
        );

        let tydro = &inputs.tydro;
        let tydro_position = tydro.current_supply_usd + tydro.current_borrow_usd;
        Self::platform(&mut b, "tydro", tydro.tx_count, tydro_position, ceil_points(tydro_position, 10.0));

        let swap = &inputs.swap;
        Self::platform(&mut b, "swap", swap.swap_count, swap.total_usd, ceil_points(swap.total_usd, 4.0));

        let shellies = &inputs.shellies;
        Self::platform(
            &mut b,
            "shellies",
            shellies.total,
            0.0,
            shellies.count("played") * 10 + shellies.count("staked") * 100 + shellies.count("raffles") * 25,
        );

        let zns = &inputs.zns;
        Self::platform(
            &mut b,
            "zns",
            zns.total,
            0.0,
            zns.count("deploy") * 10 + zns.count("gm") * 5 + zns.count("register") * 100,
        );

        let nft2me = &inputs.nft2me;
        Self::platform(
            &mut b,
            "nft2me",
            nft2me.total,
            0.0,
            nft2me.count("collections") * 25 + nft2me.count("minted") * 10,
        );

        let trading = &inputs.nft_trading;
        Self::platform(&mut b, "nft_trading", trading.total_trades, 0.0, trading.weighted_sum());

        let marvk = &inputs.marvk;
        let locked = marvk.lock_usd + marvk.vest_usd;
        Self::platform(
            &mut b,
            "marvk",
            marvk.tx_count,
            locked,
            marvk.cards_minted * 50 + ceil_points(locked, 1.5),
        );

        let perp = &inputs.perp_deposits;
        Self::platform(
            &mut b,
            "perp_deposits",
            perp.tx_count,
            perp.volume_usd,
            ceil_points(perp.deposits as f64 * 5.0 + sanitize(perp.volume_usd) * 0.1, 1.0),
        );

        let nado = &inputs.nado;
        Self::platform(
            &mut b,
            "nado",
            nado.tx_count,
            nado.volume_usd,
            ceil_points(nado.accounts as f64 * 50.0 + sanitize(nado.volume_usd) * 2.0, 1.0),
        );

        b
    }
}

/// Points for `value` under an admin rule; no matching range scores 0
pub fn rule_points(rule: &PointsRule, value: f64) -> u64 {
    let value = sanitize(value);
    match rule.calculation_mode {
        CalculationMode::Multiplier => rule
            .ranges
            .first()
            .map_or(0, |range| ceil_points(value, range.points)),
        CalculationMode::Range => rule
            .ranges
            .iter()
            .find(|r| value >= r.min && r.max.map_or(true, |max| value <= max))
            .map_or(0, |r| sanitize(r.points).max(0.0).round() as u64),
    }
}

/// Replace formula points with admin rules for the keys they name.
/// Native keys read their value; platform keys read USD volume, or the
/// transaction count when the platform has no volume.
pub fn apply_rule_overrides(breakdown: &mut ScoreBreakdown, rules: &[PointsRule]) {
    for rule in rules {
        match rule.metric_type {
            MetricType::Native => {
                if let Some(entry) = breakdown.native.get_mut(&rule.metric_key) {
                    entry.points = rule_points(rule, entry.value);
                }
            }
            MetricType::Platform => {
                if let Some(entry) = breakdown.platforms.get_mut(&rule.metric_key) {
                    let input = if entry.usd_volume > 0.0 {
                        entry.usd_volume
                    } else {
                        entry.tx_count as f64
                    };
                    entry.points = rule_points(rule, input);
                }
            }
            MetricType::Metric => {}
        }
    }
}

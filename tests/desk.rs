mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;
use uuid::Uuid;

use common::*;
use signal_desk::execution::{EntryRecommendation, Fill, OrderType, TimeInForce};
use signal_desk::market_data::BarProvider;
use signal_desk::performance::ExitReason;
use signal_desk::signal::Signal;
use signal_desk::utils::error::Error;
use signal_desk::utils::types::{DayMode, SwingStrategy, TradingStyle};
use signal_desk::SignalDesk;

async fn desk_with_pick() -> (SignalDesk, Signal) {
    let bars: Arc<dyn BarProvider> = Arc::new(FakeBars::new("polygon").with("AAPL", safe_long_bars()));
    let desk = Harness::new().desk(test_config(&["AAPL"]), vec![bars], vec![], None);
    let pick = desk.get_day_trading_picks(DayMode::Safe, false, 5).await.picks.remove(0);
    (desk, pick)
}

fn fill_at(signal: &Signal, slippage: f64) -> Fill {
    Fill { price: signal.entry_price * (1.0 + slippage), size: 100.0, time: signal.generated_at }
}

#[tokio::test]
async fn empty_result_is_not_cached() {
    let bars = Arc::new(FakeBars::new("polygon"));
    let desk = Harness::new().desk(test_config(&["AAPL", "MSFT"]), vec![bars.clone() as Arc<dyn BarProvider>], vec![], None);

    let first = desk.get_day_trading_picks(DayMode::Safe, false, 10).await;
    assert!(first.picks.is_empty());
    assert_eq!(first.diagnostics.failed_data_fetch, 2);
    let calls = bars.calls();

    desk.get_day_trading_picks(DayMode::Safe, false, 10).await;
    assert!(bars.calls() > calls, "an empty scan must be retried, not served from cache");
}

#[tokio::test]
async fn picks_are_cached_and_trimmed_to_limit() {
    let bars = Arc::new(
        FakeBars::new("polygon")
            .with("AAPL", safe_long_bars())
            .with("MSFT", trending_bars(40, 300.0, 0.002, 0.004, 200_000.0)),
    );
    let desk = Harness::new().desk(test_config(&["AAPL", "MSFT"]), vec![bars.clone() as Arc<dyn BarProvider>], vec![], None);

    let first = desk.get_day_trading_picks(DayMode::Safe, false, 10).await;
    assert_eq!(first.picks.len(), 2);
    let calls = bars.calls();

    let second = desk.get_day_trading_picks(DayMode::Safe, false, 1).await;
    assert_eq!(bars.calls(), calls);
    assert_eq!(second.picks.len(), 1);
    assert_eq!(second.picks[0], first.picks[0]);
}

#[tokio::test]
async fn small_limit_first_does_not_shrink_later_responses() {
    let bars = Arc::new(
        FakeBars::new("polygon")
            .with("AAPL", safe_long_bars())
            .with("MSFT", trending_bars(40, 300.0, 0.002, 0.004, 200_000.0)),
    );
    let desk = Harness::new().desk(test_config(&["AAPL", "MSFT"]), vec![bars.clone() as Arc<dyn BarProvider>], vec![], None);

    let one = desk.get_day_trading_picks(DayMode::Safe, false, 1).await;
    assert_eq!(one.picks.len(), 1);
    let calls = bars.calls();

    let all = desk.get_day_trading_picks(DayMode::Safe, false, 10).await;
    assert_eq!(bars.calls(), calls, "second call is served from cache");
    assert_eq!(all.picks.len(), 2);
    assert_eq!(all.picks[0], one.picks[0]);
    // picks beyond the first response's limit were persisted as well
    assert_eq!(desk.signal(all.picks[1].id).await.unwrap(), all.picks[1]);
}

#[tokio::test]
async fn stored_signals_are_retrievable_by_id() {
    let (desk, pick) = desk_with_pick().await;
    assert_eq!(desk.signal(pick.id).await.unwrap(), pick);
    assert_matches!(desk.signal(Uuid::new_v4()).await, Err(Error::InvalidArgument(_)));
}

#[tokio::test]
async fn wide_spread_day_signal_gets_a_tight_limit_band() {
    let (desk, mut pick) = desk_with_pick().await;
    pick.features.spread_bps = Some(80.0);

    let s = desk.get_execution_suggestion(&pick, None).await;
    assert_eq!(s.order_type, OrderType::Limit);
    assert_eq!(s.time_in_force, TimeInForce::Day);
    assert!((s.band_half_width_pct() - 0.0005).abs() < 1e-5);
    assert!(s.entry_strategy.contains("slippage"));
    assert_eq!(s.bracket_legs.stop, pick.stop_price);
}

#[tokio::test]
async fn entry_timing_waits_after_a_run() {
    let (desk, pick) = desk_with_pick().await;
    let now = desk.get_entry_timing(&pick, pick.entry_price).unwrap();
    assert_eq!(now.recommendation, EntryRecommendation::EnterNow);

    let ran = desk.get_entry_timing(&pick, pick.entry_price * 1.01).unwrap();
    assert_eq!(ran.recommendation, EntryRecommendation::WaitForPullback);
    assert!(ran.pullback_target.unwrap() > pick.entry_price);
    assert_matches!(desk.get_entry_timing(&pick, 0.0), Err(Error::InvalidArgument(_)));
}

#[tokio::test]
async fn fills_are_banded_and_chasing_is_flagged_per_kind() {
    let (desk, pick) = desk_with_pick().await;

    let tight = desk.record_fill("ana", &pick, fill_at(&pick, 0.0008)).await.unwrap();
    assert_eq!(tight.result.quality_score, 10.0);
    assert!(!tight.result.chased_price);

    let fair = desk.record_fill("ana", &pick, fill_at(&pick, 0.003)).await.unwrap();
    assert_eq!(fair.result.quality_score, 6.0);

    let chased = desk.record_fill("ana", &pick, fill_at(&pick, 0.006)).await.unwrap();
    assert!(chased.result.chased_price);
    assert!(chased.result.coaching_tip.contains("0.60%"), "{}", chased.result.coaching_tip);

    let swing = Signal { style: TradingStyle::Swing(SwingStrategy::Momentum), ..pick.clone() };
    let patient = desk.record_fill("ana", &swing, fill_at(&swing, 0.006)).await.unwrap();
    assert!(!patient.result.chased_price);
}

#[tokio::test]
async fn user_stats_cover_only_that_user() {
    let (desk, pick) = desk_with_pick().await;
    for slip in [0.006, 0.007, 0.001] {
        desk.record_fill("ana", &pick, fill_at(&pick, slip)).await.unwrap();
    }
    desk.record_fill("bo", &pick, fill_at(&pick, 0.0)).await.unwrap();

    let stats = desk.get_execution_quality_stats("ana", None, None).await.unwrap();
    assert_eq!(stats.fill_count, 3);
    assert_eq!(stats.chased_count, 2);
    assert!(stats.avg_slippage_pct > 0.25);
    assert!(stats.tips.iter().any(|t| t.contains("chased")));

    let empty = desk.get_execution_quality_stats("cy", None, Some(7)).await.unwrap();
    assert_eq!(empty.fill_count, 0);
    assert_eq!(empty.days, 7);
}

#[tokio::test]
async fn maintenance_profiles_steer_later_advice() {
    let (desk, mut pick) = desk_with_pick().await;
    for _ in 0..3 {
        desk.record_fill("ana", &pick, fill_at(&pick, 0.006)).await.unwrap();
    }
    pick.features.spread_bps = Some(3.0);
    pick.features.execution_quality_score = Some(9.0);
    assert_eq!(desk.get_execution_suggestion(&pick, None).await.time_in_force, TimeInForce::Ioc);

    let report = desk.maintenance().spawn().unwrap().await.unwrap().unwrap();
    assert_eq!(report.profiles_updated, 1);
    let profile = desk.store().get_symbol_profile("AAPL").await.unwrap().unwrap();
    assert_eq!(profile.fill_count, 3);

    let s = desk.get_execution_suggestion(&pick, None).await;
    assert_ne!(s.time_in_force, TimeInForce::Ioc);
    assert!(s.rationale.contains("slippage"));
}

#[tokio::test]
async fn maintenance_scores_expired_signals() {
    let (desk, pick) = desk_with_pick().await;
    let early = Signal { id: Uuid::new_v4(), generated_at: et(10, 0), ..pick };
    desk.store().save_signal(&early).await.unwrap();

    let report = desk.maintenance().run(et(10, 0) + Duration::days(1)).await.unwrap();
    assert_eq!(report.outcomes_recorded, 1);

    let outcomes = desk.store().list_signal_outcomes(Some(early.style)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    // entry is the late-session close, so the earlier bars sit below the stop
    assert_eq!(outcomes[0].exit_reason, ExitReason::Stop);

    let safe = report.snapshots.iter().find(|p| p.style == early.style).unwrap();
    assert_eq!(safe.total_signals, 1);
    assert_eq!(safe.signals_evaluated, 1);
    assert_eq!(safe.win_rate, 0.0);
}

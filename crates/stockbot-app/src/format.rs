//! 텔레그램 메시지 포맷.

use stockbot_analysis::MarketEnvAnalysis;
use stockbot_core::{ClosedTrade, IntradayAlert, Pick};
use stockbot_exchange::Balance;
use stockbot_tracking::performance::WeeklyStats;

/// 아침봇 픽 요약.
pub fn format_morning_picks(picks: &[Pick], market_env: &MarketEnvAnalysis) -> String {
    let mut lines = vec![
        "🌅 <b>[아침봇] 오늘의 픽</b>".to_string(),
        format!(
            "시장환경: {} / 주도테마: {}",
            market_env.regime,
            if market_env.leading_themes.is_empty() {
                "없음".to_string()
            } else {
                market_env.leading_themes.join(", ")
            }
        ),
        String::new(),
    ];

    if picks.is_empty() {
        lines.push("픽 없음 — 오늘은 관망".to_string());
    } else {
        for pick in picks {
            lines.push(format!(
                "{}. <b>{}</b>({}) [{}]",
                pick.rank, pick.stock_name, pick.stock_code, pick.category
            ));
            lines.push(format!(
                "   목표 {} / 손절 {} / {}",
                pick.target_return, pick.stop_loss, pick.entry_window
            ));
            lines.push(format!("   └ {}", pick.reason));
        }
    }

    lines.join("\n")
}

/// 장중 알림 1건.
pub fn format_intraday_alert(alert: &IntradayAlert) -> String {
    let type_emoji = match alert.alert_type {
        stockbot_core::AlertType::PriceTarget => "🎯",
        stockbot_core::AlertType::PriceStop => "🛑",
        stockbot_core::AlertType::BidWall => "🧱",
        stockbot_core::AlertType::SurgeMomentum => "🚀",
    };

    let mut lines = vec![
        format!(
            "{} <b>{}</b> — {}({})",
            type_emoji, alert.alert_type, alert.stock_name, alert.stock_code
        ),
        format!(
            "현재가 {}원  등락률 {:+.1}%  (직전대비 {:+.1}%)",
            alert.current_price, alert.change_rate, alert.delta_rate
        ),
    ];

    if let Some(ob) = &alert.orderbook_analysis {
        lines.push(format!(
            "호가 {} — 매수/매도 {:.2}",
            ob.strength, ob.bid_ask_ratio
        ));
    }
    if !alert.pick_reason.is_empty() {
        lines.push(format!("픽 근거: {}", alert.pick_reason));
    }
    lines.push(format!("<i>🕐 {} [{}]</i>", alert.detected_at, alert.source));

    lines.join("\n")
}

/// 청산 결과 1건.
pub fn format_closed_trade(trade: &ClosedTrade) -> String {
    let emoji = if trade.profit_amount >= 0 { "💰" } else { "📉" };
    format!(
        "{} <b>포지션 청산</b> [{}]\n\
         {}({})\n\
         매수 {}원 → 매도 {}원 × {}주\n\
         손익 <b>{:+}원</b> ({:+.2}%)\n\
         사유: {}",
        emoji,
        trade.mode,
        trade.name,
        trade.ticker,
        trade.buy_price,
        trade.sell_price,
        trade.qty,
        trade.profit_amount,
        trade.profit_rate,
        trade.close_reason.label_kr(),
    )
}

/// 주간 성과 리포트.
pub fn format_weekly_report(stats: &WeeklyStats) -> String {
    let mut lines = vec![
        format!("📅 <b>주간 리포트</b> ({})", stats.period),
        format!("총 알림: {}건", stats.total_alerts),
        String::new(),
        "<b>트리거별 7일 승률</b>".to_string(),
    ];

    if stats.trigger_stats.is_empty() {
        lines.push("  데이터 없음".to_string());
    } else {
        for row in &stats.trigger_stats {
            lines.push(format!(
                "  [{}] 승률 {:.1}% (n={}) 평균 {:+.2}%",
                row.trigger_type.as_deref().unwrap_or("unknown"),
                row.win_rate_7d.unwrap_or(0.0),
                row.tracked_7d.unwrap_or(0),
                row.avg_return_7d.unwrap_or(0.0),
            ));
        }
    }

    if !stats.top_picks.is_empty() {
        lines.push(String::new());
        lines.push("<b>7일 수익률 상위</b>".to_string());
        for row in &stats.top_picks {
            lines.push(format!(
                "  {} {:+.1}%",
                row.name.as_deref().unwrap_or(&row.ticker),
                row.return_7d.unwrap_or(0.0)
            ));
        }
    }
    if !stats.miss_picks.is_empty() {
        lines.push(String::new());
        lines.push("<b>7일 수익률 하위</b>".to_string());
        for row in &stats.miss_picks {
            lines.push(format!(
                "  {} {:+.1}%",
                row.name.as_deref().unwrap_or(&row.ticker),
                row.return_7d.unwrap_or(0.0)
            ));
        }
    }

    lines.join("\n")
}

/// 잔고 현황 (/holdings).
pub fn format_balance(balance: &Balance) -> String {
    let mut lines = vec!["💼 <b>보유 현황</b>".to_string()];

    if balance.holdings.is_empty() {
        lines.push("보유 종목 없음".to_string());
    } else {
        for h in &balance.holdings {
            lines.push(format!(
                "  {}({}) {}주 × 평단 {:.0}원 → {:.0}원 ({:+.2}%)",
                h.name, h.ticker, h.qty, h.avg_price, h.current_price, h.profit_rate
            ));
        }
    }
    lines.push(format!(
        "매수가능 {}원 / 총평가 {}원 ({:+.2}%)",
        balance.available_cash, balance.total_eval, balance.total_profit_pct
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbot_core::{AlertSource, AlertType, CapTier, CloseReason, PickCategory};

    #[test]
    fn test_format_closed_trade() {
        let trade = ClosedTrade {
            trading_id: 1,
            ticker: "005930".to_string(),
            name: "삼성전자".to_string(),
            buy_time: String::new(),
            sell_time: String::new(),
            buy_price: 10_000,
            sell_price: 10_500,
            qty: 10,
            profit_rate: 5.0,
            profit_amount: 5_000,
            trigger_source: "watchlist".to_string(),
            close_reason: CloseReason::ForceClose,
            mode: "VTS".to_string(),
            market_env: String::new(),
        };
        let text = format_closed_trade(&trade);
        assert!(text.contains("삼성전자"));
        assert!(text.contains("+5000원"));
        assert!(text.contains("강제청산"));
    }

    #[test]
    fn test_format_alert() {
        let alert = IntradayAlert {
            stock_code: "005930".to_string(),
            stock_name: "삼성전자".to_string(),
            current_price: 73_290,
            change_rate: 4.7,
            delta_rate: 1.2,
            volume_ratio: 1.5,
            momentary_strength: 40.0,
            condition_met: true,
            detected_at: "10:15:30".to_string(),
            source: AlertSource::Watchlist,
            orderbook_analysis: None,
            pick_reason: "수주 공시".to_string(),
            alert_type: AlertType::PriceTarget,
        };
        let text = format_intraday_alert(&alert);
        assert!(text.contains("가격도달_목표"));
        assert!(text.contains("+4.7%"));
        assert!(text.contains("수주 공시"));
    }

    #[test]
    fn test_format_picks_empty() {
        let text = format_morning_picks(&[], &MarketEnvAnalysis::default());
        assert!(text.contains("관망"));
    }

    #[test]
    fn test_format_picks() {
        let env = MarketEnvAnalysis {
            regime: stockbot_core::RiskRegime::RiskOn,
            leading_themes: vec!["반도체".to_string()],
            korean_market_impact: String::new(),
        };
        let picks = vec![Pick {
            rank: 1,
            stock_code: "005930".to_string(),
            stock_name: "삼성전자".to_string(),
            reason: "수주 공시".to_string(),
            category: PickCategory::Filing,
            target_return: "20%".to_string(),
            stop_loss: "-5%".to_string(),
            is_theme: false,
            entry_window: "시초가".to_string(),
            cap_tier: CapTier::Small300,
        }];
        let text = format_morning_picks(&picks, &env);
        assert!(text.contains("리스크온"));
        assert!(text.contains("삼성전자"));
        assert!(text.contains("공시"));
    }
}

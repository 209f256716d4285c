//! 06:00 원시 데이터 텔레그램 요약.
//!
//! AI 장애 시 운영자가 이 메시지를 그대로 수동 분석에 쓸 수 있도록
//! 수집 결과를 섹션별로 요약한다. 실패 수집기는 말미에 나열된다.

use crate::cache::DailyCache;

/// 캐시 → 요약 텍스트.
pub fn format_raw_data_summary(cache: &DailyCache) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("📊 [06:00 수집 완료] 원시 데이터 요약\n".to_string());

    // ── 미국 섹터 ETF (±2%+ 필터 적용된 결과만) ──────────────
    lines.push("🇺🇸 미국 섹터 (±2%+ 필터)".to_string());
    let sectors = &cache.market_data.us_market.sectors;
    if sectors.is_empty() {
        lines.push("  - 해당 없음 (±2% 초과 섹터 없음)".to_string());
    } else {
        let mut names: Vec<_> = sectors.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  - {}: {}", name, sectors[name].change));
        }
    }

    // ── 원자재 ────────────────────────────────────────────────
    if !cache.market_data.commodities.is_empty() {
        lines.push("\n🛢 원자재".to_string());
        let mut names: Vec<_> = cache.market_data.commodities.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!(
                "  - {}: {}",
                name, cache.market_data.commodities[name].change
            ));
        }
    }

    // ── 환율 ──────────────────────────────────────────────────
    if let Some(usd_krw) = cache
        .market_data
        .forex
        .get("USD/KRW")
        .or_else(|| cache.market_data.forex.get("usd_krw"))
    {
        lines.push(format!("\n💱 환율: USD/KRW {}", usd_krw));
    }

    // ── DART 공시 ─────────────────────────────────────────────
    lines.push(format!("\n📋 DART 공시 ({}건)", cache.dart_data.len()));
    if cache.dart_data.is_empty() {
        lines.push("  - 해당 없음".to_string());
    } else {
        for filing in cache.dart_data.iter().take(10) {
            let detail = if filing.summary.is_empty() {
                &filing.size
            } else {
                &filing.summary
            };
            let cap_str = if filing.market_cap > 0 {
                format!(" 시총{}억", filing.market_cap / 100_000_000)
            } else {
                String::new()
            };
            lines.push(
                format!("  - {}: {} {}{}", filing.name, filing.kind, detail, cap_str)
                    .trim_end()
                    .to_string(),
            );
        }
    }

    // ── 전날 상한가/15%+ 급등 ─────────────────────────────────
    lines.push("\n📈 전날 상한가/15%+".to_string());
    let mut movers: Vec<_> = cache
        .price_data
        .as_ref()
        .map(|p| {
            p.upper_limit
                .iter()
                .chain(p.top_gainers.iter())
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    movers.sort_by(|a, b| {
        b.change_rate
            .partial_cmp(&a.change_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if movers.is_empty() {
        lines.push("  - 해당 없음".to_string());
    } else {
        for row in movers.iter().take(10) {
            let cap_str = if row.market_cap > 0 {
                format!(" 시총{}억", row.market_cap / 100_000_000)
            } else {
                String::new()
            };
            lines.push(format!("  - {}: {:+.1}%{}", row.name, row.change_rate, cap_str));
        }
    }

    // ── 자금집중 상위 5 ───────────────────────────────────────
    lines.push("\n💰 자금집중 상위 5 (거래대금/시총 비율)".to_string());
    if cache.fund_concentration_result.is_empty() {
        lines.push("  - 해당 없음".to_string());
    } else {
        for row in cache.fund_concentration_result.iter().take(5) {
            lines.push(format!("  - {}: {:.1}%", row.name, row.ratio));
        }
    }

    // ── 공매도 상위 5 ─────────────────────────────────────────
    lines.push("\n🩳 공매도 상위 5".to_string());
    if cache.short_data.is_empty() {
        lines.push("  - 해당 없음".to_string());
    } else {
        for row in cache.short_data.iter().take(5) {
            lines.push(format!("  - {}: {:.1}%", row.name, row.short_ratio));
        }
    }

    // ── 거래량 급증 상위 5 ────────────────────────────────────
    lines.push("\n📊 거래량 급증 상위 5 (전일 대비 500%+)".to_string());
    if cache.volume_surge_result.is_empty() {
        lines.push("  - 해당 없음".to_string());
    } else {
        for row in cache.volume_surge_result.iter().take(5) {
            lines.push(format!("  - {}: {:.0}x", row.name, row.volume_ratio));
        }
    }

    // ── 실패 플래그 ───────────────────────────────────────────
    let failed = cache.failed_collectors();
    if !failed.is_empty() {
        lines.push(format!("\n⚠️ 수집 실패: {}", failed.join(", ")));
    }

    lines.push("\n─────────────────────────────".to_string());
    lines.push("⚠️ AI 장애 시 이 메시지를 수동 분석에 활용하세요.".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ConcentrationRow, FilingRecord, PriceData, PriceRow};

    #[test]
    fn test_summary_empty_cache() {
        let cache = DailyCache::default();
        let summary = format_raw_data_summary(&cache);
        assert!(summary.contains("📊 [06:00 수집 완료]"));
        assert!(summary.contains("해당 없음"));
        // 플래그 미기록 상태에서는 전 수집기가 실패 목록에 나온다
        assert!(summary.contains("⚠️ 수집 실패:"));
    }

    #[test]
    fn test_summary_sections() {
        let mut cache = DailyCache::default();
        cache.dart_data.push(FilingRecord {
            name: "예시기업".to_string(),
            kind: "단일판매공급계약".to_string(),
            summary: "수주 320억".to_string(),
            market_cap: 80_000_000_000,
            ..Default::default()
        });
        cache.fund_concentration_result.push(ConcentrationRow {
            name: "집중종목".to_string(),
            ratio: 31.5,
            ..Default::default()
        });
        let mut price = PriceData::default();
        price.upper_limit.push(PriceRow {
            name: "상한가종목".to_string(),
            change_rate: 29.9,
            market_cap: 50_000_000_000,
            ..Default::default()
        });
        cache.price_data = Some(price);

        let summary = format_raw_data_summary(&cache);
        assert!(summary.contains("예시기업: 단일판매공급계약 수주 320억 시총800억"));
        assert!(summary.contains("상한가종목: +29.9% 시총500억"));
        assert!(summary.contains("집중종목: 31.5%"));
    }
}

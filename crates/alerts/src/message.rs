//! Telegram message rendering.

use chrono::TimeDelta;
use pricestep_core::{Alert, FixedPoint};
use pricestep_engine::PriceMove;

/// Format price with appropriate precision based on magnitude.
pub fn format_price(price: FixedPoint) -> String {
    if price.is_zero() {
        return "$0".to_string();
    }
    let value = price.to_f64();
    if value >= 1000.0 {
        format!("${:.2}", value)
    } else if value >= 1.0 {
        format!("${:.4}", value)
    } else if value >= 0.01 {
        format!("${:.6}", value)
    } else {
        // Sub-cent prices keep every stored digit.
        format!("${}", price)
    }
}

/// Human readable interval: `"just now"`, `"42s"`, `"3m 5s"`, `"2h 10m"`.
pub fn format_time_interval(elapsed: TimeDelta) -> String {
    if elapsed < TimeDelta::zero() {
        return "N/A".to_string();
    }
    let total = elapsed.num_seconds();
    if total < 1 {
        return "just now".to_string();
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format a fired alert as an HTML message.
pub fn format_alert_message(price_move: &PriceMove) -> String {
    let mut msg = format!(
        "🚨 <b>Price Alert: {}</b> 🚨\n\n<b>Current Price:</b> {}",
        price_move.symbol,
        format_price(price_move.price)
    );

    match (price_move.previous_price, price_move.abs_delta()) {
        (Some(previous), Some(delta)) => {
            let arrow = if price_move.is_up() { "📈" } else { "📉" };
            let sign = if price_move.is_up() { "+" } else { "-" };
            msg.push_str(&format!("\n<b>Previous Alert:</b> {}", format_price(previous)));
            match price_move.percent_change() {
                Some(pct) => msg.push_str(&format!(
                    "\n<b>Change:</b> {} {}{} ({:+.2}%)",
                    arrow,
                    sign,
                    format_price(delta),
                    pct
                )),
                None => msg.push_str(&format!(
                    "\n<b>Change:</b> {} {}{}",
                    arrow,
                    sign,
                    format_price(delta)
                )),
            }
        }
        _ => msg.push_str("\n<b>Previous Alert:</b> none (first observation)"),
    }

    if let Some(elapsed) = price_move.elapsed() {
        msg.push_str(&format!(
            "\n<b>Time since last alert:</b> {}",
            format_time_interval(elapsed)
        ));
    }

    msg.push_str(&format!("\n\n<b>Alert Step:</b> ${}", price_move.step));
    msg
}

/// One line per alert for `/alerts`.
pub fn format_alert_line(alert: &Alert) -> String {
    let status = if alert.active { "🟢" } else { "⏸" };
    let baseline = alert
        .baseline_price
        .map(format_price)
        .unwrap_or_else(|| "pending".to_string());
    format!(
        "{} <b>#{}</b> {} step ${} (baseline {})",
        status, alert.id, alert.symbol, alert.step, baseline
    )
}

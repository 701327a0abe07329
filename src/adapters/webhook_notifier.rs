//! Discord-style webhook notifier.

use std::time::Duration;

use serde::Serialize;

use crate::domain::error::AlphascanError;
use crate::domain::result::BacktestResult;
use crate::ports::notify_port::Notifier;

const EMBED_COLOR: u32 = 0x03b2f8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    /// `url = None` builds a disabled notifier; a direct `send` on it fails.
    pub fn new(url: Option<String>) -> Result<Self, AlphascanError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AlphascanError::Notifier {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { url, client })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn payload(result: &BacktestResult, script_file: Option<&str>) -> WebhookPayload {
    let field = |name: &'static str, value: String| EmbedField {
        name,
        value,
        inline: true,
    };
    WebhookPayload {
        embeds: vec![Embed {
            title: format!("Alpha Found: {}", result.indicator_name),
            description: format!("Ticker: **{}**", result.ticker),
            color: EMBED_COLOR,
            fields: vec![
                field("Return", format!("{}%", result.return_pct)),
                field("Buy & Hold", format!("{}%", result.buy_hold_return_pct)),
                field("Max Drawdown", format!("{}%", result.max_drawdown_pct)),
                field("Trades", result.num_trades.to_string()),
                field("Win Rate", format!("{}%", result.win_rate_pct)),
                field("Profit Factor", result.profit_factor.to_string()),
                field("Sharpe Ratio", result.sharpe_ratio.to_string()),
            ],
            footer: script_file.map(|s| EmbedFooter {
                text: format!("Script: {s}"),
            }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }],
    }
}

impl Notifier for WebhookNotifier {
    fn send(
        &self,
        result: &BacktestResult,
        script_file: Option<&str>,
    ) -> Result<(), AlphascanError> {
        let url = self.url.as_deref().ok_or_else(|| AlphascanError::Notifier {
            reason: "no webhook URL configured".into(),
        })?;

        let response = self
            .client
            .post(url)
            .json(&payload(result, script_file))
            .send()
            .map_err(|e| AlphascanError::Notifier {
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlphascanError::Notifier {
                reason: format!("webhook returned {status}"),
            });
        }
        tracing::info!(indicator = %result.indicator_name, %status, "notification sent");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.is_configured()
    }
}

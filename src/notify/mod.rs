pub mod telegram;

use anyhow::Result;

use crate::engine::Candidate;

pub use telegram::TelegramNotifier;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one formatted alert. `Ok` means the channel accepted it.
    async fn send(&self, text: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Logs alerts instead of sending them; used when no bot token is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        tracing::info!(target: "alerts", "{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// HTML alert body for Telegram (`parse_mode = HTML`).
pub fn format_alert(c: &Candidate) -> String {
    let s = &c.sample;
    format!(
        "🔥 <b>Аномально низкая цена</b>\n\
         📦 <b>{name}</b>\n\
         💸 Цена: <b>{price} ₽</b>\n\
         📉 Падение от средней: <b>−{drop}%</b>\n\
         🛒 Магазин: {store}\n\
         🔗 <a href='{link}'>Открыть товар</a>",
        name = html_escape::encode_text(&s.name),
        price = group_thousands(s.price.trunc() as i64),
        drop = c.drop_percent.trunc() as i64,
        store = s.source_label(),
        link = html_escape::encode_single_quoted_attribute(&s.link),
    )
}

/// `1234567` → `"1 234 567"`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

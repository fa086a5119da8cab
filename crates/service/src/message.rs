//! Order text sent to the shop's chat and the deep link that pre-fills it.

use app_config::AppConfig;
use model::{CartItem, CustomerInfo, OrderLogEntry, format_rupiah};
use serde::Serialize;

/// One ordered line as it appears in the message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: u32,
    pub name: String,
    pub quantity: u32,
    pub line_total: u64,
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.id(),
            name: item.product.name.clone(),
            quantity: item.quantity,
            line_total: item.line_total(),
        }
    }
}

/// Snapshot of everything an order message is built from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub lines: Vec<OrderLine>,
    pub total: u64,
    pub promo_details: String,
    pub customer: CustomerInfo,
}

impl OrderDraft {
    /// `- <name> (x<qty>)` per line, newline separated.
    pub fn order_details(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("- {} (x{})", line.name, line.quantity))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn formatted_total(&self) -> String {
        format_rupiah(self.total)
    }

    pub fn log_entry(&self) -> OrderLogEntry {
        OrderLogEntry {
            customer: self.customer.clone(),
            order_details: self.order_details(),
            total: self.formatted_total(),
            promo_details: self.promo_details.clone(),
        }
    }
}

/// Shop-specific parts of the hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    shop_name: String,
    base_url: String,
    recipient: String,
}

impl MessageTemplate {
    pub fn new(
        shop_name: impl Into<String>,
        base_url: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            shop_name: shop_name.into(),
            base_url: base_url.into(),
            recipient: recipient.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.shop_name.clone(),
            cfg.messaging_base_url.clone(),
            cfg.messaging_recipient.clone(),
        )
    }

    pub fn render(&self, draft: &OrderDraft) -> String {
        let customer = &draft.customer;
        format!(
            "Halo {shop}, saya mau pesan:\n\n\
             *Pesanan:*\n{details}\n\n\
             *Total: {total}* (belum termasuk ongkir)\n\
             *Bonus:* {promo}\n\n\
             *Data Pemesan:*\n\
             Nama: {name}\n\
             No. WA: {phone}\n\
             Alamat: {address}\n\
             Kode Pos: {postal_code}\n\n\
             Terima kasih.",
            shop = self.shop_name,
            details = draft.order_details(),
            total = draft.formatted_total(),
            promo = draft.promo_details,
            name = customer.name,
            phone = customer.phone,
            address = customer.address,
            postal_code = customer.postal_code,
        )
    }

    /// `<base>/<recipient>?text=<percent-encoded message>`
    pub fn deep_link(&self, draft: &OrderDraft) -> String {
        format!(
            "{}/{}?text={}",
            self.base_url.trim_end_matches('/'),
            self.recipient,
            urlencoding::encode(&self.render(draft))
        )
    }
}

//! Rupiah display formatting: `Rp` prefix, `.` thousands separator, no decimals.

const SYMBOL: &str = "Rp";
const GROUP_SEPARATOR: char = '.';

/// Formats a whole-rupiah amount, e.g. `15000` → `Rp15.000`.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(SYMBOL.len() + digits.len() + digits.len() / 3);
    out.push_str(SYMBOL);

    let lead = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - lead) % 3 == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(ch);
    }
    out
}

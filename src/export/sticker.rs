use super::html::escape_html;
use crate::config::StickerConfig;
use crate::entry::{EntryRecord, LogEntry};
use crate::error::ExportError;
use crate::history::{format_exp_date, DisplayZone};

const LABEL_CSS: &str = r#"<style>
:root{--labelOrange:#ff7a00;--labelInk:#0b0c10}
body{margin:24px;font-family:Arial,Helvetica,sans-serif}
.labelSticker{width:100%;max-width:560px;background:var(--labelOrange);color:var(--labelInk);border:3px solid #111;border-radius:10px;padding:12px 12px 10px}
.labelTop{display:flex;justify-content:space-between;margin-bottom:6px}
.labelMeta{font-size:12px;line-height:1.15;font-weight:800}
.labelFacility{font-size:13px;letter-spacing:.2px;font-weight:900}
.labelDept,.labelPhone{opacity:.92;font-weight:800;margin-top:2px}
.labelTitle{text-align:center;font-weight:900;letter-spacing:.8px;font-size:22px;margin:6px 0 10px;text-transform:uppercase}
.labelRow{display:flex;gap:10px;align-items:baseline;margin:9px 0}
.labelKey{width:175px;font-size:13px;font-weight:800}
.labelVal{flex:1;font-size:14px;font-weight:900;padding-bottom:2px;border-bottom:2px solid rgba(0,0,0,.55);padding-left:6px}
.labelFoot{margin-top:10px;font-size:11px;font-weight:800;opacity:.92;text-align:center;padding-top:6px;border-top:1px solid rgba(0,0,0,.18)}
</style>"#;

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "—".to_string()
    } else {
        value.to_string()
    }
}

/// Printable label for a crash cart check; prints itself when opened
pub fn render_sticker(
    entry: &LogEntry,
    sticker: &StickerConfig,
    zone: &DisplayZone,
) -> Result<String, ExportError> {
    let cart = match &entry.record {
        EntryRecord::CrashCart(cart) => cart,
        EntryRecord::WoundVac(_) => {
            return Err(ExportError::Unsupported("Sticker printing"))
        }
    };

    let exp = if cart.exp_date.trim().is_empty() {
        "—".to_string()
    } else {
        format_exp_date(&cart.exp_date)
    };

    let rows = [
        ("First supply to expire:", or_dash(&cart.first_expire)),
        ("Exp date:", exp),
        ("Check date done:", zone.format_timestamp(entry.created_at)),
        ("CS tech:", or_dash(&cart.tech_name)),
        ("Lock #:", or_dash(&cart.lock_number)),
        ("Cart:", or_dash(&cart.cart_id)),
    ];
    let rows: String = rows
        .iter()
        .map(|(key, value)| {
            format!(
                "<div class=\"labelRow\"><div class=\"labelKey\">{}</div><div class=\"labelVal\">{}</div></div>\n",
                escape_html(key),
                escape_html(value)
            )
        })
        .collect();

    Ok(format!(
        r#"<!doctype html><html><head><meta charset="utf-8" />{css}</head><body>
<div class="labelSticker">
<div class="labelTop"><div class="labelMeta">
<div class="labelFacility">{facility}</div>
<div class="labelDept">{department}</div>
<div class="labelPhone">{phone}</div>
</div></div>
<div class="labelTitle">Crash Cart Check</div>
{rows}<div class="labelFoot">PHI-free log &bull; No patient identifiers</div>
</div>
<script>window.onload=()=>window.print();</script>
</body></html>
"#,
        css = LABEL_CSS,
        facility = escape_html(&sticker.facility),
        department = escape_html(&sticker.department),
        phone = escape_html(&sticker.phone),
        rows = rows,
    ))
}

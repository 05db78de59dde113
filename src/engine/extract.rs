use crate::model::CustomerInfo;

const ORDERS_TO: &str = "ORDERS TO:";
const PHONE_MARKER: &str = "Telf.";

/// Pull customer name, address and phone out of the detail surface text.
/// Anything not found keeps its placeholder.
pub fn extract_customer_info(surface_text: &str) -> CustomerInfo {
    let mut info = CustomerInfo::default();
    let lines: Vec<&str> = surface_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if let Some(idx) = lines.iter().position(|l| l.contains(ORDERS_TO)) {
        if let Some(name) = lines.get(idx + 1) {
            info.name = (*name).to_string();
        }
        if let Some(address) = lines.get(idx + 2) {
            info.address = (*address).to_string();
        }
    }

    let phone = lines
        .iter()
        .find_map(|l| l.split_once(PHONE_MARKER))
        .map(|(_, rest)| rest.trim())
        .filter(|p| !p.is_empty());
    if let Some(phone) = phone {
        info.phone = phone.to_string();
    }

    info
}

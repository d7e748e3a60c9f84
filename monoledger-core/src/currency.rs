//! ISO 4217 numeric codes and minor-unit amounts.

use rust_decimal::Decimal;

pub const UAH: u16 = 980;
pub const USD: u16 = 840;
pub const EUR: u16 = 978;

/// Symbol for a numeric currency code, if we know one.
pub fn symbol(code: u16) -> Option<&'static str> {
    let s = match code {
        980 => "₴",
        840 => "$",
        978 => "€",
        826 => "£",
        985 => "zł",
        203 => "Kč",
        348 => "Ft",
        756 => "₣",
        392 => "¥",
        156 => "元",
        643 => "₽",
        933 => "Br",
        949 => "₺",
        376 => "₪",
        410 => "₩",
        356 => "₹",
        975 => "лв",
        946 => "lei",
        208 | 578 | 752 => "kr",
        981 => "₾",
        398 => "₸",
        _ => return None,
    };
    Some(s)
}

/// Symbol or, for unknown currencies, the numeric code itself.
pub fn label(code: u16) -> String {
    symbol(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

/// Minor units (hundredths) to a normalized major-unit decimal: 15000 -> 150, -1050 -> -10.5.
pub fn to_major(minor: i64) -> Decimal {
    Decimal::new(minor, 2).normalize()
}

/// `150₴`, `-10.5$`, `42.1999`.
pub fn format_amount(minor: i64, code: u16) -> String {
    format!("{}{}", to_major(minor), label(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_units_are_normalized() {
        assert_eq!(to_major(15000).to_string(), "150");
        assert_eq!(to_major(-1050).to_string(), "-10.5");
        assert_eq!(to_major(1).to_string(), "0.01");
        assert_eq!(to_major(0).to_string(), "0");
    }

    #[test]
    fn known_and_unknown_currencies() {
        assert_eq!(format_amount(15000, UAH), "150₴");
        assert_eq!(format_amount(-250, USD), "-2.5$");
        assert_eq!(format_amount(100, 999), "1999");
    }
}

//! 金额格式化
//! 最小单位整数与展示字符串互转，不做四舍五入

use ethers::types::U256;

use crate::error::{WalletError, WalletResult};

/// 最小单位 → 展示字符串，去掉小数部分末尾的 0
///
/// `format_units(1_000_000_000, 9) == "1"`，`format_units(1_500_000, 9) == "0.0015"`
pub fn format_units(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// 展示字符串 → 最小单位；小数位超出精度时报错而非截断
pub fn parse_units(value: &str, decimals: u8) -> WalletResult<U256> {
    let value = value.trim();
    let invalid = || WalletError::InvalidAmount(value.to_string());

    if value.is_empty() {
        return Err(invalid());
    }

    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > decimals as usize {
        return Err(WalletError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            value, decimals
        )));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    digits.push_str(frac_trimmed);
    digits.push_str(&"0".repeat(decimals as usize - frac_trimmed.len()));

    U256::from_dec_str(&digits).map_err(|_| invalid())
}

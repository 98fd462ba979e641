use proptest::prelude::*;

use kinhsach_backend::helpers::normalize_key;
use kinhsach_backend::roman::{resolve_numeral, roman_to_int};

fn to_roman(mut n: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"), (900, "CM"), (500, "D"), (400, "CD"), (100, "C"), (90, "XC"),
        (50, "L"), (40, "XL"), (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
    ];
    let mut s = String::new();
    for (value, symbol) in TABLE {
        while n >= value {
            s.push_str(symbol);
            n -= value;
        }
    }
    s
}

#[test]
fn test_roman_section_numbers() {
    let cases = [("I", 1), ("II", 2), ("IV", 4), ("IX", 9), ("XIV", 14), ("XL", 40), ("XCIX", 99), ("MCMXCIV", 1994)];
    for (token, value) in cases {
        assert_eq!(roman_to_int(token), Some(value), "{}", token);
        assert_eq!(resolve_numeral(&token.to_lowercase()), Some(value), "{}", token);
    }
    assert_eq!(roman_to_int("PHẨM"), None);
}

#[test]
fn test_normalize_catalogue_titles() {
    assert_eq!(normalize_key(Some("Trường A Hàm")), normalize_key(Some("TRƯỜNG A HÀM")));
    assert_eq!(normalize_key(Some("Tăng Nhất A Hàm")), "tangnhataham");
    assert_eq!(normalize_key(Some("Kinh-Truong-A-Ham")), "kinhtruongaham");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalize_is_idempotent(s in "\\PC{0,40}") {
        let once = normalize_key(Some(s.as_str()));
        prop_assert_eq!(normalize_key(Some(once.as_str())), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn normalize_ignores_case(s in "[a-zA-Z0-9 àáảãạăằắẳẵặâầấẩẫậđèéẻẽẹêềếểễệìíỉĩịòóỏõọôồốổỗộơờớởỡợùúủũụưừứửữựỳýỷỹỵ]{0,40}") {
        prop_assert_eq!(normalize_key(Some(s.to_uppercase().as_str())), normalize_key(Some(s.as_str())));
    }

    #[test]
    fn roman_numerals_resolve(n in 1u32..4000) {
        prop_assert_eq!(resolve_numeral(&to_roman(n)), Some(n));
    }
}

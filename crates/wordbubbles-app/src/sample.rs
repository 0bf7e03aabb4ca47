//! Built-in sample feeds, one per time range, shaped like the analytics
//! endpoint's `{ "words": [...] }` payload.

use wordbubbles_core::TimeRange;

const DAY: &str = r#"{
    "words": [
        {"word": "Gago", "count": 156, "category": "insult", "severity": 8},
        {"word": "Tangina", "count": 120, "category": "insult", "severity": 9},
        {"word": "Bobo", "count": 89, "category": "insult", "severity": 5},
        {"word": "Ulol", "count": 67, "category": "insult", "severity": 6},
        {"word": "Punyeta", "count": 54, "category": "harassment", "severity": 7},
        {"word": "Leche", "count": 48, "category": "harassment", "severity": 4},
        {"word": "Hayop", "count": 41, "category": "slur", "severity": 6},
        {"word": "Peste", "count": 33, "category": "slur", "severity": 3},
        {"word": "Buwisit", "count": 25, "category": "harassment", "severity": 2},
        {"word": "Tarantado", "count": 19, "category": "insult", "severity": 7},
        {"word": "Gunggong", "count": 12, "category": "insult", "severity": 4},
        {"word": "Inutil", "count": 8, "category": "insult", "severity": 3}
    ]
}"#;

const MONTH: &str = r#"{
    "words": [
        {"word": "Tangina", "count": 2140, "category": "insult", "severity": 9},
        {"word": "Gago", "count": 1984, "category": "insult", "severity": 8},
        {"word": "Punyeta", "count": 1203, "category": "harassment", "severity": 7},
        {"word": "Bobo", "count": 1120, "category": "insult", "severity": 5},
        {"word": "Hayop", "count": 845, "category": "slur", "severity": 6},
        {"word": "Ulol", "count": 790, "category": "insult", "severity": 6},
        {"word": "Tarantado", "count": 512, "category": "insult", "severity": 7},
        {"word": "Leche", "count": 488, "category": "harassment", "severity": 4},
        {"word": "Peste", "count": 341, "category": "slur", "severity": 3},
        {"word": "Buwisit", "count": 260, "category": "harassment", "severity": 2}
    ]
}"#;

const YEAR: &str = r#"{
    "words": [
        {"word": "Gago", "count": 24810, "category": "insult", "severity": 8},
        {"word": "Tangina", "count": 23950, "category": "insult", "severity": 9},
        {"word": "Bobo", "count": 14502, "category": "insult", "severity": 5},
        {"word": "Punyeta", "count": 12011, "category": "harassment", "severity": 7},
        {"word": "Ulol", "count": 9870, "category": "insult", "severity": 6},
        {"word": "Hayop", "count": 9114, "category": "slur", "severity": 6},
        {"word": "Leche", "count": 6233, "category": "harassment", "severity": 4},
        {"word": "Tarantado", "count": 5942, "category": "insult", "severity": 7},
        {"word": "Peste", "count": 4120, "category": "slur", "severity": 3},
        {"word": "Buwisit", "count": 3310, "category": "harassment", "severity": 2},
        {"word": "Gunggong", "count": 1650, "category": "insult", "severity": 4},
        {"word": "Inutil", "count": 980, "category": "insult", "severity": 3}
    ]
}"#;

pub fn payload(range: TimeRange) -> &'static str {
    match range {
        TimeRange::Day => DAY,
        TimeRange::Month => MONTH,
        TimeRange::Year => YEAR,
    }
}

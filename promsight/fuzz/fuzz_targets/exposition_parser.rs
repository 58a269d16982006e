#![no_main]

use libfuzzer_sys::fuzz_target;
use promsight::{
    Overview,
    config::Views,
    parser::{self, Line},
};

fuzz_target!(|data: &[u8]| {
    // Try to parse the input as UTF-8
    if let Ok(text) = std::str::from_utf8(data) {
        fuzz_exposition_parser(text);
    }
});

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn fuzz_exposition_parser(text: &str) {
    let exposition = parser::parse_text(text);

    // Every kept sample came from its own line.
    assert!(exposition.samples.len() <= text.lines().count());

    for sample in &exposition.samples {
        assert!(
            valid_metric_name(&sample.name),
            "Parser should reject invalid metric names: {:?}",
            sample.name
        );
        for key in sample.labels.keys() {
            assert!(!key.is_empty(), "Label key should not be empty");
        }
    }

    // Line by line agrees with the fold.
    let kept = text
        .lines()
        .filter(|line| matches!(parser::parse_line(line), Line::Sample(_)))
        .count();
    assert_eq!(kept, exposition.samples.len());

    // The pipeline is deterministic and every derived view is total.
    let first = promsight::parse(text);
    let second = promsight::parse(text);
    assert_eq!(format!("{first:?}"), format!("{second:?}"));

    let overview = Overview::build(&first, &Views::default());
    assert!(overview.providers.len() <= first.custom.len());
    assert!(overview.routes.len() <= first.server_request.len());
}

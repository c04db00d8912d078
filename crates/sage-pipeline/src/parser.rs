use serde::Deserialize;

use crate::error::PipelineError;

/// Normalized parse of one LLM reply: the narrative with the grade token
/// removed, and the grade on the canonical 1.0-10.0 scale with one
/// decimal digit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGrade {
    pub narrative_text: String,
    pub grade: f64,
}

/// Legacy wire format: a bare JSON object with a 0-1 score.
#[derive(Deserialize)]
struct LegacyEnvelope {
    score: f64,
    explanation: String,
}

/// Interpret raw LLM output under the two supported wire formats.
///
/// Attempted in fixed order: the legacy JSON object first, then the
/// trailing-grade text format. A JSON decode failure is not an error by
/// itself; it falls through to the text format. No fallback grade is
/// ever substituted: an unparsable reply is a `GradeExtraction` error.
pub fn parse(raw: &str) -> Result<ParsedGrade, PipelineError> {
    if let Some(result) = try_legacy_json(raw) {
        return result;
    }
    parse_trailing_grade(raw)
}

/// Format 1: the entire text is `{"score": <0..1>, "explanation": "..."}`.
/// Returns None when the text does not decode as that shape.
fn try_legacy_json(raw: &str) -> Option<Result<ParsedGrade, PipelineError>> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let legacy: LegacyEnvelope = serde_json::from_str(trimmed).ok()?;

    // Decoded fine but the score is out of contract: that is a bad
    // grade, not a reason to re-read the JSON as prose.
    if !(0.0..=1.0).contains(&legacy.score) {
        return Some(Err(PipelineError::GradeExtraction(format!(
            "legacy score {} outside [0, 1]",
            legacy.score
        ))));
    }

    Some(Ok(ParsedGrade {
        narrative_text: legacy.explanation,
        grade: (legacy.score * 100.0).round() / 10.0,
    }))
}

/// Format 2: prose terminated by a grade token matching one or two
/// digits with at most one decimal digit, in [1.0, 10.0].
fn parse_trailing_grade(raw: &str) -> Result<ParsedGrade, PipelineError> {
    let trimmed = raw.trim_end();
    // Punctuation after the token ("... 8.5.") does not invalidate it.
    let body = trimmed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_end();

    let token_start = body
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| {
            PipelineError::GradeExtraction("no trailing numeric grade token".to_string())
        })?;

    let token = &body[token_start..];
    let value = validate_grade_token(token)?;

    Ok(ParsedGrade {
        narrative_text: body[..token_start].trim_end().to_string(),
        grade: value,
    })
}

fn validate_grade_token(token: &str) -> Result<f64, PipelineError> {
    let (int_part, frac_part) = match token.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (token, None),
    };

    let int_ok = !int_part.is_empty()
        && int_part.len() <= 2
        && int_part.bytes().all(|b| b.is_ascii_digit());
    let frac_ok = match frac_part {
        None => true,
        Some(f) => f.len() == 1 && f.bytes().all(|b| b.is_ascii_digit()),
    };
    if !int_ok || !frac_ok {
        return Err(PipelineError::GradeExtraction(format!(
            "trailing token {token:?} does not match the grade pattern"
        )));
    }

    let value: f64 = token
        .parse()
        .map_err(|e| PipelineError::GradeExtraction(format!("token {token:?}: {e}")))?;
    if !(1.0..=10.0).contains(&value) {
        return Err(PipelineError::GradeExtraction(format!(
            "grade {value} outside the 1.0-10.0 scale"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_failure(raw: &str) {
        match parse(raw) {
            Err(PipelineError::GradeExtraction(_)) => {}
            other => panic!("expected GradeExtraction for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn legacy_json_scales_score_to_canonical_range() {
        let parsed = parse(r#"{"score": 0.72, "explanation": "solid"}"#).unwrap();
        assert_eq!(parsed.grade, 7.2);
        assert_eq!(parsed.narrative_text, "solid");
    }

    #[test]
    fn legacy_json_rounds_to_one_decimal() {
        let parsed = parse(r#"{"score": 0.725, "explanation": "x"}"#).unwrap();
        assert_eq!(parsed.grade, 7.3);
        let parsed = parse(r#"{"score": 0.0, "explanation": "bearish"}"#).unwrap();
        assert_eq!(parsed.grade, 0.0);
        let parsed = parse(r#"{"score": 1.0, "explanation": "bullish"}"#).unwrap();
        assert_eq!(parsed.grade, 10.0);
    }

    #[test]
    fn legacy_json_score_out_of_range_is_an_error() {
        expect_failure(r#"{"score": 1.5, "explanation": "too eager"}"#);
        expect_failure(r#"{"score": -0.1, "explanation": "negative"}"#);
    }

    #[test]
    fn malformed_json_falls_through_to_text_format() {
        let parsed = parse("{not json at all, but trailing grade 8.5").unwrap();
        assert_eq!(parsed.grade, 8.5);

        // A JSON object without the legacy keys is prose to us.
        let parsed = parse(r#"{"verdict": "fine"} overall 7.0"#).unwrap();
        assert_eq!(parsed.grade, 7.0);
    }

    #[test]
    fn trailing_grade_extracted_and_stripped() {
        let parsed = parse("Revenue grew and margins held. Strong financial metrics. 8.5").unwrap();
        assert_eq!(parsed.grade, 8.5);
        assert_eq!(
            parsed.narrative_text,
            "Revenue grew and margins held. Strong financial metrics."
        );
        assert!(!parsed.narrative_text.contains("8.5"));
    }

    #[test]
    fn integer_grades_accepted() {
        assert_eq!(parse("Flat quarter. 7").unwrap().grade, 7.0);
        assert_eq!(parse("Peak bullishness. 10").unwrap().grade, 10.0);
        assert_eq!(parse("Top marks. 10.0").unwrap().grade, 10.0);
    }

    #[test]
    fn grade_above_ten_rejected() {
        expect_failure("Stable outlook. 10.1");
        expect_failure("Off the chart. 11");
    }

    #[test]
    fn grade_below_one_rejected() {
        expect_failure("Abysmal. 0.9");
        expect_failure("Nothing left. 0");
    }

    #[test]
    fn two_decimal_digits_rejected() {
        expect_failure("Stable outlook. 5.22");
    }

    #[test]
    fn no_trailing_token_rejected() {
        expect_failure("An RSI of 70 suggests the stock is overbought.");
        expect_failure("");
        expect_failure("   \n  ");
    }

    #[test]
    fn mid_text_numbers_are_not_grabbed() {
        // The number must terminate the text; embedded figures do not count.
        expect_failure("RSI of 70 and a P/E of 12.5 argue for caution going forward.");
    }

    #[test]
    fn trailing_punctuation_after_token_tolerated() {
        let parsed = parse("Decent setup. 6.5.").unwrap();
        assert_eq!(parsed.grade, 6.5);
        assert_eq!(parsed.narrative_text, "Decent setup.");
    }

    #[test]
    fn malformed_trailing_token_rejected() {
        // Scanning back through digits and dots must not salvage a
        // partial match out of a longer token.
        expect_failure("Released in version 1.8.5");
        expect_failure("Year in review 2024");
    }

    #[test]
    fn whitespace_separators_removed_from_narrative() {
        let parsed = parse("Tight consolidation range.\n\n 9.0\n").unwrap();
        assert_eq!(parsed.grade, 9.0);
        assert_eq!(parsed.narrative_text, "Tight consolidation range.");
    }

    #[test]
    fn bare_grade_token_gives_empty_narrative() {
        let parsed = parse("8.0").unwrap();
        assert_eq!(parsed.grade, 8.0);
        assert_eq!(parsed.narrative_text, "");
    }
}

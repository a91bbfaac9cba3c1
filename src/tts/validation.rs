//! Request validation
//!
//! Runs before rate limiting or cache lookup. Every failure is a
//! non-retryable `Error::Validation`.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use super::request::SynthesisRequest;
use crate::{Error, Result};

/// Accepted speaking rate multipliers
pub const SPEAKING_RATE_RANGE: RangeInclusive<f64> = 0.25..=4.0;

/// Accepted pitch shift in semitones
pub const PITCH_RANGE: RangeInclusive<f64> = -20.0..=20.0;

/// Accepted volume gain in dB
pub const VOLUME_GAIN_RANGE: RangeInclusive<f64> = -96.0..=16.0;

static LANGUAGE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2,3}(-[A-Z][a-z]{3})?-[A-Z]{2}$").expect("valid regex")
});

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([A-Za-z][\w:.-]*)([^<>]*?)(/?)>").expect("valid regex")
});

/// Checks request fields before any I/O happens
#[derive(Debug, Clone, Copy)]
pub struct RequestValidator {
    max_text_length: usize,
}

impl RequestValidator {
    #[must_use]
    pub const fn new(max_text_length: usize) -> Self {
        Self { max_text_length }
    }

    /// Validate every field of `request`
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the first offending field
    pub fn validate(&self, request: &SynthesisRequest) -> Result<()> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(invalid("text must not be empty"));
        }

        let length = request.character_count();
        if length > self.max_text_length {
            return Err(invalid(format!(
                "text is {length} characters, limit is {}",
                self.max_text_length
            )));
        }

        if !LANGUAGE_CODE.is_match(&request.language_code) {
            return Err(invalid(format!(
                "malformed language code: {:?}",
                request.language_code
            )));
        }

        if request.voice_id.trim().is_empty() {
            return Err(invalid("voice id must not be empty"));
        }

        check_range("speaking rate", request.speaking_rate, &SPEAKING_RATE_RANGE)?;
        check_range("pitch", request.pitch, &PITCH_RANGE)?;
        check_range("volume gain", request.volume_gain_db, &VOLUME_GAIN_RANGE)?;

        if request.ssml {
            validate_ssml(text)?;
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

fn check_range(field: &str, value: f64, range: &RangeInclusive<f64>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!(
            "{field} {value} outside [{}, {}]",
            range.start(),
            range.end()
        )))
    }
}

/// Check that an SSML document has a `<speak>` root and balanced tags
///
/// Self-closing tags such as `<break/>` do not count toward the balance.
///
/// # Errors
///
/// Returns `Error::Validation` for a missing root or unbalanced tags
pub fn validate_ssml(ssml: &str) -> Result<()> {
    let doc = ssml.trim();
    if !has_speak_root(doc) || !doc.ends_with("</speak>") {
        return Err(invalid("SSML must be wrapped in <speak>...</speak>"));
    }

    let mut opened = 0usize;
    let mut closed = 0usize;
    for tag in MARKUP_TAG.captures_iter(doc) {
        let closing = !tag[1].is_empty();
        let self_closing = !tag[4].is_empty();
        if closing {
            closed += 1;
        } else if !self_closing {
            opened += 1;
        }
    }

    if opened != closed {
        return Err(invalid(format!(
            "SSML has {opened} opening and {closed} closing tags"
        )));
    }

    Ok(())
}

/// `<speak>` or `<speak ...>`, but not another tag that shares the prefix
fn has_speak_root(doc: &str) -> bool {
    doc.strip_prefix("<speak")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|next| next == '>' || next.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RequestValidator {
        RequestValidator::new(5000)
    }

    fn assert_invalid(request: &SynthesisRequest) {
        assert!(
            matches!(validator().validate(request), Err(Error::Validation(_))),
            "expected validation error for {request:?}"
        );
    }

    #[test]
    fn accepts_default_request() {
        validator().validate(&SynthesisRequest::new("Hello")).unwrap();
    }

    #[test]
    fn rejects_empty_and_blank_text() {
        assert_invalid(&SynthesisRequest::new(""));
        assert_invalid(&SynthesisRequest::new("   \n"));
    }

    #[test]
    fn rejects_text_over_limit() {
        let validator = RequestValidator::new(10);
        assert!(validator.validate(&SynthesisRequest::new("0123456789")).is_ok());
        assert!(validator.validate(&SynthesisRequest::new("0123456789a")).is_err());
    }

    #[test]
    fn language_codes() {
        for ok in ["en-US", "cmn-CN", "yue-HK", "sr-Latn-RS"] {
            validator()
                .validate(&SynthesisRequest::new("hi").with_voice(ok, "voice"))
                .unwrap();
        }
        for bad in ["", "english", "EN-us", "en_US", "en-USA"] {
            assert_invalid(&SynthesisRequest::new("hi").with_voice(bad, "voice"));
        }
    }

    #[test]
    fn rejects_empty_voice() {
        assert_invalid(&SynthesisRequest::new("hi").with_voice("en-US", " "));
    }

    #[test]
    fn speaking_rate_boundaries() {
        assert_invalid(&SynthesisRequest::new("hi").with_speaking_rate(0.24));
        validator()
            .validate(&SynthesisRequest::new("hi").with_speaking_rate(0.25))
            .unwrap();
        validator()
            .validate(&SynthesisRequest::new("hi").with_speaking_rate(4.0))
            .unwrap();
        assert_invalid(&SynthesisRequest::new("hi").with_speaking_rate(4.01));
        assert_invalid(&SynthesisRequest::new("hi").with_speaking_rate(f64::NAN));
    }

    #[test]
    fn pitch_and_gain_boundaries() {
        validator()
            .validate(&SynthesisRequest::new("hi").with_pitch(-20.0).with_volume_gain_db(16.0))
            .unwrap();
        assert_invalid(&SynthesisRequest::new("hi").with_pitch(20.5));
        assert_invalid(&SynthesisRequest::new("hi").with_volume_gain_db(-96.1));
        assert_invalid(&SynthesisRequest::new("hi").with_volume_gain_db(16.1));
    }

    #[test]
    fn ssml_balance() {
        validate_ssml("<speak><break/>hi</speak>").unwrap();
        validate_ssml(r#"<speak>Hi <break time="1s"/> <emphasis level="strong">there</emphasis></speak>"#)
            .unwrap();
        assert!(validate_ssml("<speak><break>hi</speak>").is_err());
    }

    #[test]
    fn ssml_requires_root() {
        assert!(validate_ssml("hello").is_err());
        assert!(validate_ssml("<p>hello</p>").is_err());
        assert!(validate_ssml("<speak>hello").is_err());
        assert!(validate_ssml("<speaker>hello</speak>").is_err());
        assert!(validate_ssml("<speakers>hello</speakers></speak>").is_err());
        validate_ssml("<speak version=\"1.1\">hello</speak>").unwrap();
        validate_ssml("<speak\nxml:lang=\"en-US\">hello</speak>").unwrap();
    }

    #[test]
    fn ssml_checked_only_when_flagged() {
        validator()
            .validate(&SynthesisRequest::new("<speak><break>hi</speak>"))
            .unwrap();
        assert_invalid(&SynthesisRequest::new("<speak><break>hi</speak>").with_ssml(true));
    }
}

//! Relevance scoring.
//!
//! Friendly sources get a single asymptotic boost toward 1.0. When sentiment
//! confidences are available, their mean *replaces* the boost. Confidences are
//! expected in [0,1]; no clamping is applied.

/// Share of the remaining distance to 1.0 granted to a trusted author.
pub const FRIENDLY_BOOST: f64 = 0.5;

pub fn score(is_friendly: bool, sentiment_confidences: Option<&[f64]>) -> f64 {
    let mut relevance = 0.0_f64;

    if is_friendly {
        relevance += (1.0 - relevance) * FRIENDLY_BOOST;
    }

    if let Some(conf) = sentiment_confidences.filter(|c| !c.is_empty()) {
        relevance = conf.iter().sum::<f64>() / conf.len() as f64;
    }

    relevance
}

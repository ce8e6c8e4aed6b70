use serde::{Deserialize, Serialize};

use crate::models::{CandidateHints, Model};

/// Search parameters for one index crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
    /// Only completed sales
    pub only_sold: bool,
    /// Restrict to one model line
    pub model: Option<Model>,
    /// Free-text trim filter, e.g. "GT3"
    pub trim: Option<String>,
    /// Hard upper bound on result pages
    pub max_pages: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            only_sold: true,
            model: None,
            trim: None,
            max_pages: 10,
        }
    }
}

impl IndexParams {
    /// Search phrase for sites with free-text search
    pub fn query(&self) -> String {
        let mut query = String::from("porsche");
        if let Some(model) = self.model {
            query.push(' ');
            query.push_str(&model.as_str().to_lowercase());
        }
        if let Some(trim) = &self.trim {
            query.push(' ');
            query.push_str(&trim.to_lowercase());
        }
        query
    }

    /// URL path segment for a model, e.g. `911`, `carrera-gt`
    pub fn model_slug(&self) -> Option<String> {
        self.model.map(|m| m.as_str().to_lowercase().replace(' ', "-"))
    }
}

/// A listing URL discovered on an index page
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub hints: CandidateHints,
}

/// One page of index results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub page: u32,
    pub candidates: Vec<Candidate>,
    /// Cards the site returned before sold/model/trim filtering
    pub raw_count: usize,
    pub has_more: bool,
}

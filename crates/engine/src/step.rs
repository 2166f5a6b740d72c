//! The fixed CRAG topology as an explicit state machine.
//!
//! ```text
//! retrieve -> grade_documents -+-> generate
//!                              |
//!                              +-> transform_query -> web_search -> generate
//! ```

use crate::components::Grade;
use crate::state::{Document, WebSearchDecision};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One node of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Retrieve,
    GradeDocuments,
    TransformQuery,
    WebSearch,
    Generate,
}

impl Step {
    /// The step every run starts with.
    pub const FIRST: Step = Step::Retrieve;

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Retrieve => "retrieve",
            Step::GradeDocuments => "grade_documents",
            Step::TransformQuery => "transform_query",
            Step::WebSearch => "web_search",
            Step::Generate => "generate",
        }
    }

    /// The step that follows this one, or `None` once the run is over.
    ///
    /// After grading the successor depends on the grading decision; a
    /// grading step that produced no decision has no successor.
    pub fn next(self, decision: Option<WebSearchDecision>) -> Option<Step> {
        match self {
            Step::Retrieve => Some(Step::GradeDocuments),
            Step::GradeDocuments => decision.map(|d| decide_to_generate(d).step()),
            Step::TransformQuery => Some(Step::WebSearch),
            Step::WebSearch => Some(Step::Generate),
            Step::Generate => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the run goes after grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    TransformQuery,
    Generate,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::TransformQuery => "transform_query",
            Route::Generate => "generate",
        }
    }

    pub fn step(&self) -> Step {
        match self {
            Route::TransformQuery => Step::TransformQuery,
            Route::Generate => Step::Generate,
        }
    }
}

/// The branch decision: correct the evidence first, or answer directly.
pub fn decide_to_generate(needs_web_search: WebSearchDecision) -> Route {
    match needs_web_search {
        WebSearchDecision::Yes => Route::TransformQuery,
        WebSearchDecision::No => Route::Generate,
    }
}

/// Keep the documents graded relevant, in their original order.
///
/// A single irrelevant document is enough to require a web search, even when
/// others were relevant. With no documents nothing irrelevant was found, so
/// no search is needed. `grades[i]` is the verdict for `documents[i]`.
pub fn filter_relevant(
    documents: Vec<Document>,
    grades: &[Grade],
) -> (Vec<Document>, WebSearchDecision) {
    let any_irrelevant = grades.iter().any(|g| !g.relevant);
    let filtered = documents
        .into_iter()
        .zip(grades)
        .filter(|(_, grade)| grade.relevant)
        .map(|(doc, _)| doc)
        .collect();

    let decision = if any_irrelevant {
        WebSearchDecision::Yes
    } else {
        WebSearchDecision::No
    };
    (filtered, decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> Vec<Document> {
        (0..n).map(|i| Document::new(format!("doc {}", i))).collect()
    }

    fn grades(verdicts: &[bool]) -> Vec<Grade> {
        verdicts.iter().map(|&relevant| Grade { relevant }).collect()
    }

    #[test]
    fn test_decision_is_total() {
        assert_eq!(
            decide_to_generate(WebSearchDecision::Yes).as_str(),
            "transform_query"
        );
        assert_eq!(decide_to_generate(WebSearchDecision::No).as_str(), "generate");
    }

    #[test]
    fn test_linear_transitions() {
        assert_eq!(Step::Retrieve.next(None), Some(Step::GradeDocuments));
        assert_eq!(Step::TransformQuery.next(None), Some(Step::WebSearch));
        assert_eq!(Step::WebSearch.next(None), Some(Step::Generate));
        assert_eq!(Step::Generate.next(Some(WebSearchDecision::Yes)), None);
    }

    #[test]
    fn test_grading_branches_on_decision() {
        assert_eq!(
            Step::GradeDocuments.next(Some(WebSearchDecision::Yes)),
            Some(Step::TransformQuery)
        );
        assert_eq!(
            Step::GradeDocuments.next(Some(WebSearchDecision::No)),
            Some(Step::Generate)
        );
        assert_eq!(Step::GradeDocuments.next(None), None);
    }

    #[test]
    fn test_one_irrelevant_document_requires_search() {
        let (kept, decision) = filter_relevant(docs(4), &grades(&[true, true, false, true]));
        assert_eq!(decision, WebSearchDecision::Yes);
        let contents: Vec<&str> = kept.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["doc 0", "doc 1", "doc 3"]);
    }

    #[test]
    fn test_all_relevant_needs_no_search() {
        let (kept, decision) = filter_relevant(docs(2), &grades(&[true, true]));
        assert_eq!(decision, WebSearchDecision::No);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_no_documents_needs_no_search() {
        let (kept, decision) = filter_relevant(Vec::new(), &[]);
        assert_eq!(decision, WebSearchDecision::No);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_all_irrelevant_keeps_nothing() {
        let (kept, decision) = filter_relevant(docs(3), &grades(&[false, false, false]));
        assert_eq!(decision, WebSearchDecision::Yes);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_step_names_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&Step::GradeDocuments).unwrap(),
            "\"grade_documents\""
        );
        assert_eq!(Step::WebSearch.to_string(), "web_search");
    }
}

/// Readable content returned by the extraction API for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub content: String,
    pub title: Option<String>,
}

/// A generated explanation together with the exact prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub markdown: String,
    pub prompt: String,
}

//! Answer synthesis: retrieval context assembly, generation, and
//! response post-processing.
//!
//! Every request follows one of three paths — general chat with no
//! retrieval, single-document retrieval, or multi-document merge — and all
//! retrieval paths converge on parse-and-clean: stray prompt headers are
//! stripped, the suggested-questions block is split off at the first known
//! marker, numbered suggestions are extracted, and blank-line runs
//! collapse to a single break.
//!
//! Backend failures never propagate as errors from this module; they come
//! back as a structured response with `success = false`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{GenerationConfig, PipelineConfig, RetrievalConfig};
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::history::{ConversationMemory, NO_CONTEXT};
use crate::index::ScoredChunk;
use crate::memo::{self, MemoizedResponse, QueryScope, ResponseMemoizer};
use crate::models::{QueryResponse, SourceCitation};
use crate::store::DocumentStore;

/// Fixed response when no passages could be retrieved for a scoped query.
pub const NOTHING_FOUND: &str = "No content found in any of the documents for your query.";

const SYSTEM_SINGLE: &str =
    "You are a helpful assistant that can maintain conversation context and search documents.";
const SYSTEM_MULTI: &str =
    "You are a helpful assistant that can search across multiple documents and maintain conversation context.";

/// Section headers the generation backend sometimes echoes back.
const UNWANTED_HEADERS: &[&str] = &[
    "### YOUR RESPONSE ###",
    "### INSTRUCTIONS FOR THE ASSISTANT ###",
    "### CONVERSATION CONTEXT ###",
    "### PDF CONTENT ###",
    "### USER QUESTION ###",
];

/// Tolerated variants of the follow-up questions marker. The first one
/// found wins; scanning stops there.
const SUGGESTION_MARKERS: &[&str] = &[
    "### SUGGESTED QUESTIONS ###",
    "SUGGESTED QUESTIONS:",
    "### Suggested Questions",
    "##Suggested Questions",
    "Suggested Questions",
    "[Title: SUGGESTED QUESTIONS:]",
];

const PROMPT_TEMPLATE: &str = "\
You are a helpful and concise AI assistant for answering questions about uploaded documents.

INSTRUCTIONS:
1. Answer the user's question accurately based ONLY on the provided context (PDF CONTENT).
2. Format your answer clearly using markdown formatting:
   - Use **bold** for important information
   - Use bullet points (- ) for lists
   - Use short paragraphs for explanations
   - Be direct and to the point
3. You MUST cite your sources clearly after your answer. For each piece of information, reference the source in this exact format: `(Source: [filename], Page: [page])`. If using multiple sources, list them all.
4. If the provided PDF CONTENT is empty, irrelevant to the user's question, or does not contain the answer, you MUST respond with: \"I couldn't find a specific answer to your question in the available documents.\" Do not invent an answer.

CONVERSATION CONTEXT:
{conversation_history}

PDF CONTENT:
{pdf_extract}

USER QUESTION:
{question}

Please provide your response using proper markdown formatting, followed by source citations. After your complete response, provide exactly 3 relevant follow-up questions in this format:

### SUGGESTED QUESTIONS ###
1. [First relevant question]
2. [Second relevant question]
3. [Third relevant question]";

pub struct AnswerSynthesizer {
    store: Arc<DocumentStore>,
    generator: Arc<dyn GenerationBackend>,
    memory: ConversationMemory,
    memo: ResponseMemoizer,
    retrieval: RetrievalConfig,
    generation: GenerationConfig,
    prompt_turns: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<DocumentStore>,
        generator: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            store,
            generator,
            memory: ConversationMemory::new(&config.memory),
            memo: ResponseMemoizer::new(&config.memo),
            retrieval: config.retrieval.clone(),
            generation: config.generation.clone(),
            prompt_turns: config.memory.prompt_turns,
        }
    }

    /// Answer a query, optionally scoped to a single document.
    pub async fn query(
        &self,
        query: &str,
        document_id: Option<&str>,
        session_id: Option<&str>,
    ) -> QueryResponse {
        match document_id {
            None => self.answer_general(query, session_id).await,
            Some(doc_id) => self.answer_single(query, doc_id, session_id).await,
        }
    }

    /// Answer a query across several documents, merging their passages.
    pub async fn query_multi(
        &self,
        query: &str,
        document_ids: &[String],
        session_id: Option<&str>,
    ) -> QueryResponse {
        if document_ids.is_empty() {
            return Self::nothing_found();
        }

        let key = memo::response_key(query, &QueryScope::Multi(document_ids));
        if let Some(hit) = self.memo.get(&key) {
            debug!("serving memoized multi-document response");
            return QueryResponse::answer(hit.answer, hit.sources, hit.suggestions);
        }

        let mut merged: Vec<(ScoredChunk, String)> = Vec::new();
        for doc_id in document_ids {
            match self
                .store
                .search(doc_id, query, self.retrieval.search_k)
                .await
            {
                Ok(scored) => merged.extend(scored.into_iter().map(|s| (s, doc_id.clone()))),
                Err(e) => {
                    // one broken document must not fail the whole request
                    warn!(doc_id = %doc_id, error = %e, "skipping document in multi-document search");
                    continue;
                }
            }
        }
        if merged.is_empty() {
            return Self::nothing_found();
        }

        merged.sort_by(|a, b| {
            b.0.relevance
                .partial_cmp(&a.0.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(self.retrieval.max_context_passages);

        let extract = merged
            .iter()
            .map(|(s, _)| s.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let citations: Vec<SourceCitation> = merged
            .iter()
            .map(|(s, doc_id)| citation(s, Some(doc_id)))
            .collect();

        self.generate_cited(query, session_id, SYSTEM_MULTI, extract, citations, key)
            .await
    }

    async fn answer_general(&self, query: &str, session_id: Option<&str>) -> QueryResponse {
        let history = session_id.map(|s| self.memory.transcript(s, self.prompt_turns));
        let has_context = history.as_deref().is_some_and(|h| h != NO_CONTEXT);

        // only context-free answers are reusable across sessions
        let key = memo::response_key(query, &QueryScope::General);
        if !has_context {
            if let Some(hit) = self.memo.get(&key) {
                debug!("serving memoized general response");
                if let Some(session) = session_id {
                    self.memory.append(session, query, &hit.answer);
                }
                return QueryResponse::answer(hit.answer, None, hit.suggestions);
            }
        }

        let prompt = if has_context {
            format!(
                "Previous conversation context:\n{}\n\nCurrent question: {}",
                history.as_deref().unwrap_or_default(),
                query
            )
        } else {
            query.to_string()
        };

        let request = GenerationRequest {
            system: None,
            prompt,
            model: self.generation.general_model.clone(),
            max_tokens: self.generation.general_max_tokens,
        };
        let raw = match self.generator.complete(request).await {
            Ok(raw) => raw,
            Err(e) => return QueryResponse::failure(format!("Error generating response: {}", e)),
        };

        if let Some(session) = session_id {
            self.memory.append(session, query, &raw);
        }
        if !has_context {
            self.memo.put(
                key,
                MemoizedResponse {
                    answer: raw.clone(),
                    sources: None,
                    suggestions: Vec::new(),
                },
            );
        }
        // no document scope: raw output, no citation machinery
        QueryResponse::answer(raw, None, Vec::new())
    }

    async fn answer_single(
        &self,
        query: &str,
        doc_id: &str,
        session_id: Option<&str>,
    ) -> QueryResponse {
        let key = memo::response_key(query, &QueryScope::Single(doc_id));
        if let Some(hit) = self.memo.get(&key) {
            debug!(doc_id, "serving memoized response");
            return QueryResponse::answer(hit.answer, hit.sources, hit.suggestions);
        }

        let scored = match self
            .store
            .search(doc_id, query, self.retrieval.search_k)
            .await
        {
            Ok(scored) => scored,
            Err(e) => return QueryResponse::failure(format!("Error generating response: {}", e)),
        };
        if scored.is_empty() {
            return Self::nothing_found();
        }

        let extract = scored
            .iter()
            .map(|s| s.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let citations: Vec<SourceCitation> = scored.iter().map(|s| citation(s, None)).collect();

        self.generate_cited(query, session_id, SYSTEM_SINGLE, extract, citations, key)
            .await
    }

    async fn generate_cited(
        &self,
        query: &str,
        session_id: Option<&str>,
        system: &str,
        extract: String,
        citations: Vec<SourceCitation>,
        memo_key: String,
    ) -> QueryResponse {
        let history = session_id
            .map(|s| self.memory.transcript(s, self.prompt_turns))
            .unwrap_or_default();

        let prompt = PROMPT_TEMPLATE
            .replace("{conversation_history}", &history)
            .replace("{pdf_extract}", &extract)
            .replace("{question}", query);

        let request = GenerationRequest {
            system: Some(system.to_string()),
            prompt,
            model: self.generation.document_model.clone(),
            max_tokens: self.generation.document_max_tokens,
        };
        let raw = match self.generator.complete(request).await {
            Ok(raw) => raw,
            Err(e) => return QueryResponse::failure(format!("Error generating response: {}", e)),
        };

        let (answer, suggestions) = parse_and_clean(&raw);

        if let Some(session) = session_id {
            self.memory.append(session, query, &answer);
        }
        self.memo.put(
            memo_key,
            MemoizedResponse {
                answer: answer.clone(),
                sources: Some(citations.clone()),
                suggestions: suggestions.clone(),
            },
        );

        QueryResponse::answer(answer, Some(citations), suggestions)
    }

    fn nothing_found() -> QueryResponse {
        QueryResponse {
            success: false,
            answer: NOTHING_FOUND.to_string(),
            content_type: "markdown".to_string(),
            sources: Some(Vec::new()),
            suggestions: Vec::new(),
        }
    }
}

/// Render a retrieved passage as a citation.
fn citation(scored: &ScoredChunk, document_id: Option<&str>) -> SourceCitation {
    let content = &scored.chunk.content;
    let content_preview = if content.chars().count() > 100 {
        let truncated: String = content.chars().take(100).collect();
        format!("{}...", truncated)
    } else {
        content.clone()
    };

    SourceCitation {
        filename: scored.chunk.filename.clone(),
        page: scored.chunk.page,
        chunk: scored.chunk.chunk_index,
        content_preview,
        relevance_score: scored.relevance,
        title: format!("{} - Page {}", scored.chunk.filename, scored.chunk.page),
        document_id: document_id.map(str::to_string),
    }
}

/// Split raw model output into a cleaned answer body and the extracted
/// follow-up suggestions.
pub fn parse_and_clean(raw: &str) -> (String, Vec<String>) {
    let mut body = raw.to_string();
    for header in UNWANTED_HEADERS {
        body = body.replace(header, "");
    }

    let mut suggestions = Vec::new();
    for marker in SUGGESTION_MARKERS {
        if let Some(pos) = body.find(marker) {
            let tail = body[pos + marker.len()..].to_string();
            body.truncate(pos);

            for line in tail.lines() {
                let line = line.trim();
                if line.starts_with("1.") || line.starts_with("2.") || line.starts_with("3.") {
                    let suggestion = line[2..].trim();
                    if !suggestion.is_empty()
                        && !suggestion.starts_with('[')
                        && !suggestion.starts_with('#')
                    {
                        suggestions.push(suggestion.to_string());
                    }
                }
            }
            break;
        }
    }

    let body = body.replace("###", "");
    let body = collapse_blank_lines(&body);
    (body, suggestions)
}

/// Collapse runs of blank lines to a single blank line and trim the ends.
fn collapse_blank_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_blank_run = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            in_blank_run = true;
            continue;
        }
        if in_blank_run && !out.is_empty() {
            out.push("");
        }
        in_blank_run = false;
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

//! Pipeline driver: the stage state machine.
//!
//! Sequences the stages of a run against the checkpoint store. Each stage
//! follows the same discipline:
//!
//! 1. If the run's status already covers the stage, load its asset and
//!    skip the work (resume case).
//! 2. Otherwise do the work, persisting partial output incrementally.
//! 3. Write the complete asset, then advance the status, then persist the
//!    run state — in that order, so a crash between the writes leaves the
//!    status unchanged and the stage safely re-executes over a complete
//!    asset.
//!
//! Topic extraction and record generation fan out through the bounded
//! executor; everything else is a direct sequential call. When a later
//! stage finds upstream output insufficient, the driver takes one of the
//! named backward transitions and re-enters the acquisition stages.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::admission::AdmissionFilter;
use crate::checkpoint::{run_id_for_request, CheckpointStore, RunState};
use crate::config::PipelineConfig;
use crate::content::Chunker;
use crate::error::{DriverError, StageError, StoreError};
use crate::export::{self, FinalDataset};
use crate::llm::{prompts, TextGenerator};
use crate::scrape::PageFetcher;
use crate::search::SearchProvider;
use crate::types::{ContentChunk, ParsedRequest, ScrapedPage, SearchHit, SyntheticRecord};

use super::executor::{FanOutExecutor, WorkOutcome};
use super::stage::{self, assets, StageStatus, Transition};

/// Checkpoint keys for fine-grained progress inside stages.
const CK_SEARCH_INDEX: &str = "last_searched_query_index";
const CK_SCRAPE_INDEX: &str = "last_scraped_url_index";
const CK_ROUND: &str = "acquisition_round";

/// Output asset of the topic-extraction stage. Carries the processed
/// chunk ids alongside the topics so a resume skips completed chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicAsset {
    pub topics: Vec<String>,
    pub processed_chunks: Vec<String>,
}

/// Output asset of the record-generation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationAsset {
    /// Unique records admitted so far.
    pub records: Vec<SyntheticRecord>,
    /// Normalized keys of topics whose generation completed.
    pub completed_topics: Vec<String>,
    /// Candidate records produced, duplicates included.
    pub total_generated: usize,
}

/// Queryable snapshot of a run's progress.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub request: String,
    pub status: StageStatus,
    pub target_sample_count: usize,
    pub unique_topics: usize,
    pub unique_records: usize,
    pub acquisition_round: usize,
    pub updated_at: DateTime<Utc>,
}

/// Loads the progress report for a run.
pub async fn report(store: &CheckpointStore, run_id: &str) -> Result<RunReport, StoreError> {
    let state = store
        .load(run_id)
        .await?
        .ok_or_else(|| StoreError::UnknownRun(run_id.to_string()))?;
    let unique_topics = store
        .load_asset::<TopicAsset>(run_id, assets::EXTRACTED_TOPICS)
        .await?
        .map(|t| t.topics.len())
        .unwrap_or(0);
    let unique_records = store
        .load_asset::<GenerationAsset>(run_id, assets::SYNTHETIC_DATA)
        .await?
        .map(|g| g.records.len())
        .unwrap_or(0);
    Ok(RunReport {
        run_id: state.run_id.clone(),
        request: state.request.clone(),
        status: state.status,
        target_sample_count: state.target_sample_count,
        unique_topics,
        unique_records,
        acquisition_round: state.checkpoint_usize(CK_ROUND, 0),
        updated_at: state.updated_at,
    })
}

struct TopicSink {
    asset: TopicAsset,
    seen: HashSet<String>,
}

/// Drives one pipeline run to completion (or as far as the available
/// source material allows).
pub struct PipelineDriver {
    config: PipelineConfig,
    store: CheckpointStore,
    llm: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    executor: FanOutExecutor,
}

impl PipelineDriver {
    pub fn new(
        config: PipelineConfig,
        store: CheckpointStore,
        llm: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let executor = FanOutExecutor::new(config.max_workers);
        Self {
            config,
            store,
            llm,
            search,
            fetcher,
            executor,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn sampling(&self) -> prompts::SamplingParams {
        prompts::SamplingParams {
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        }
    }

    /// Runs the pipeline for `request`, resuming any persisted progress
    /// for the same (normalized) request text.
    ///
    /// Returns the final dataset artifact. The run reaches `completed`
    /// status only when the unique-record count meets the target;
    /// otherwise the artifact reports a sub-100% completion rate and the
    /// run stays resumable.
    pub async fn run(
        &self,
        request: &str,
        target_override: Option<usize>,
    ) -> Result<FinalDataset, DriverError> {
        let run_id = run_id_for_request(request);
        let mut state = match self.store.load(&run_id).await? {
            Some(existing) => {
                info!(run_id = %run_id, status = %existing.status, "resuming run");
                existing
            }
            None => {
                let fresh = RunState::fresh(&run_id, request);
                self.store.persist(&fresh).await?;
                info!(run_id = %run_id, "starting new run");
                fresh
            }
        };

        if state.status.is_terminal() {
            if let Some(dataset) = self
                .store
                .load_asset(&run_id, assets::FINAL_DATASET)
                .await?
            {
                info!(run_id = %run_id, "run already completed");
                return Ok(dataset);
            }
        }

        // The admission filter is run-scoped; rebuild it from persisted
        // assets so resumed work cannot re-admit what earlier invocations
        // already produced.
        let filter = AdmissionFilter::new();
        self.reseed_admission(&state, &filter).await?;

        let parsed = self.stage_parse(&mut state, request, target_override).await?;
        let required_topics = parsed.required_topics(self.config.records_per_topic);
        let mut last_progress: Option<(usize, usize)> = None;

        loop {
            let round = state.checkpoint_usize(CK_ROUND, 0);

            let queries = self.stage_refine(&mut state, &parsed).await?;
            let hits = self.stage_search(&mut state, &filter, &queries).await?;
            let pages = self.stage_scrape(&mut state, &hits).await?;
            let chunks = self.stage_chunk(&mut state, &pages).await?;
            let topic_asset = self
                .stage_extract(&mut state, &parsed, &chunks, required_topics)
                .await?;

            let topics_now = topic_asset.topics.len();
            if topics_now < required_topics && round + 1 < self.config.max_acquisition_rounds {
                let stalled = last_progress.is_some_and(|(t, _)| t == topics_now);
                if stalled {
                    warn!(
                        topics = topics_now,
                        required = required_topics,
                        "no new topics this round, generating from what we have"
                    );
                } else {
                    last_progress = Some((topics_now, self.record_count(&state.run_id).await?));
                    self.apply_transition(&mut state, stage::insufficient_topics(), round + 1)
                        .await?;
                    continue;
                }
            }

            let generated = self
                .stage_generate(&mut state, &filter, &parsed, &topic_asset.topics)
                .await?;
            let records_now = generated.records.len();

            if records_now >= parsed.sample_count {
                info!(
                    records = records_now,
                    target = parsed.sample_count,
                    "target sample count reached"
                );
                return self.stage_finalize(&mut state, &parsed, &generated).await;
            }

            let stalled = last_progress.is_some_and(|(t, r)| t == topics_now && r == records_now);
            if round + 1 >= self.config.max_acquisition_rounds || stalled {
                warn!(
                    records = records_now,
                    target = parsed.sample_count,
                    rounds = round + 1,
                    "no further progress possible, finalizing below target"
                );
                return self.stage_finalize(&mut state, &parsed, &generated).await;
            }

            last_progress = Some((topics_now, records_now));
            self.apply_transition(&mut state, stage::insufficient_records(), round + 1)
                .await?;
        }
    }

    /// Raises the status (never lowers it) and persists the run state.
    /// Callers write the stage asset before calling this.
    async fn advance(&self, state: &mut RunState, to: StageStatus) -> Result<(), StoreError> {
        if state.status < to {
            state.status = to;
        }
        state.updated_at = Utc::now();
        self.store.persist(state).await
    }

    /// Applies a named backward transition: invalidates the round's
    /// assets, resets the per-stage checkpoint indexes, and lowers the
    /// status.
    async fn apply_transition(
        &self,
        state: &mut RunState,
        transition: Transition,
        next_round: usize,
    ) -> Result<(), StoreError> {
        info!(
            transition = transition.name,
            round = next_round,
            "looping back for more source material"
        );
        for asset in transition.invalidate {
            self.store.clear_asset(&state.run_id, asset).await?;
        }
        state.clear_checkpoint(CK_SEARCH_INDEX);
        state.clear_checkpoint(CK_SCRAPE_INDEX);
        state.set_checkpoint(CK_ROUND, next_round as u64);
        state.status = transition.next;
        state.updated_at = Utc::now();
        self.store.persist(state).await
    }

    async fn reseed_admission(
        &self,
        state: &RunState,
        filter: &AdmissionFilter,
    ) -> Result<(), StoreError> {
        if let Some(hits) = self
            .store
            .load_asset::<Vec<SearchHit>>(&state.run_id, assets::SEARCH_RESULTS)
            .await?
        {
            for hit in &hits {
                let _ = filter.admit_url(&hit.url);
            }
        }
        if let Some(generated) = self
            .store
            .load_asset::<GenerationAsset>(&state.run_id, assets::SYNTHETIC_DATA)
            .await?
        {
            for record in &generated.records {
                let _ = filter.admit_content(&record.content);
            }
        }
        debug!(
            urls = filter.admitted_urls(),
            content = filter.admitted_content(),
            "admission filter reseeded from persisted assets"
        );
        Ok(())
    }

    async fn record_count(&self, run_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .store
            .load_asset::<GenerationAsset>(run_id, assets::SYNTHETIC_DATA)
            .await?
            .map(|g| g.records.len())
            .unwrap_or(0))
    }

    async fn stage_parse(
        &self,
        state: &mut RunState,
        request: &str,
        target_override: Option<usize>,
    ) -> Result<ParsedRequest, DriverError> {
        if state.status >= StageStatus::QueryParsed {
            if let Some(parsed) = self
                .store
                .load_asset(&state.run_id, assets::PARSED_REQUEST)
                .await?
            {
                return Ok(parsed);
            }
        }

        let mut parsed =
            prompts::parse_request(self.llm.as_ref(), request, self.sampling()).await?;
        if let Some(target) = target_override {
            parsed.sample_count = target;
        }
        self.store
            .save_asset(&state.run_id, assets::PARSED_REQUEST, &parsed)
            .await?;
        state.target_sample_count = parsed.sample_count;
        self.advance(state, StageStatus::QueryParsed).await?;
        info!(
            domain = %parsed.domain,
            data_type = %parsed.data_type,
            language = %parsed.language,
            target = parsed.sample_count,
            "request parsed"
        );
        Ok(parsed)
    }

    async fn stage_refine(
        &self,
        state: &mut RunState,
        parsed: &ParsedRequest,
    ) -> Result<Vec<String>, DriverError> {
        if state.status >= StageStatus::QueryRefined {
            if let Some(queries) = self
                .store
                .load_asset(&state.run_id, assets::REFINED_QUERIES)
                .await?
            {
                return Ok(queries);
            }
        }

        let queries = prompts::refine_queries(
            self.llm.as_ref(),
            parsed,
            self.config.refined_query_count,
            self.sampling(),
        )
        .await?;
        self.store
            .save_asset(&state.run_id, assets::REFINED_QUERIES, &queries)
            .await?;
        self.advance(state, StageStatus::QueryRefined).await?;
        info!(count = queries.len(), "search queries refined");
        Ok(queries)
    }

    async fn stage_search(
        &self,
        state: &mut RunState,
        filter: &AdmissionFilter,
        queries: &[String],
    ) -> Result<Vec<SearchHit>, DriverError> {
        if state.status >= StageStatus::WebSearched {
            if let Some(hits) = self
                .store
                .load_asset(&state.run_id, assets::SEARCH_RESULTS)
                .await?
            {
                return Ok(hits);
            }
        }

        let mut hits: Vec<SearchHit> = self
            .store
            .load_asset(&state.run_id, assets::SEARCH_RESULTS)
            .await?
            .unwrap_or_default();
        let start = state.checkpoint_usize(CK_SEARCH_INDEX, 0);

        for (i, query) in queries.iter().enumerate().skip(start) {
            match self.search.search(query, self.config.results_per_query).await {
                Ok(results) => {
                    for hit in results {
                        match filter.admit_url(&hit.url) {
                            Ok(_) => hits.push(hit),
                            Err(reason) => {
                                debug!(url = %hit.url, %reason, "search result rejected")
                            }
                        }
                    }
                }
                // One query's failure never aborts the rest of the round.
                Err(e) => warn!(query = %query, error = %e, "query failed, continuing"),
            }
            self.store
                .save_asset(&state.run_id, assets::SEARCH_RESULTS, &hits)
                .await?;
            state.set_checkpoint(CK_SEARCH_INDEX, (i + 1) as u64);
            self.store.persist(state).await?;
        }

        state.clear_checkpoint(CK_SEARCH_INDEX);
        self.advance(state, StageStatus::WebSearched).await?;
        info!(count = hits.len(), "web search complete");
        Ok(hits)
    }

    async fn stage_scrape(
        &self,
        state: &mut RunState,
        hits: &[SearchHit],
    ) -> Result<Vec<ScrapedPage>, DriverError> {
        if state.status >= StageStatus::WebScraped {
            if let Some(pages) = self
                .store
                .load_asset(&state.run_id, assets::SCRAPED_CONTENT)
                .await?
            {
                return Ok(pages);
            }
        }

        let mut pages: Vec<ScrapedPage> = self
            .store
            .load_asset(&state.run_id, assets::SCRAPED_CONTENT)
            .await?
            .unwrap_or_default();
        let start = state.checkpoint_usize(CK_SCRAPE_INDEX, 0);

        for (i, hit) in hits.iter().enumerate().skip(start) {
            match self.fetcher.fetch(&hit.url).await {
                Ok(page) if page.word_count >= self.config.min_page_words => pages.push(page),
                Ok(page) => {
                    debug!(url = %hit.url, words = page.word_count, "page too thin, discarded")
                }
                Err(e) => warn!(url = %hit.url, error = %e, "scrape failed, continuing"),
            }
            self.store
                .save_asset(&state.run_id, assets::SCRAPED_CONTENT, &pages)
                .await?;
            state.set_checkpoint(CK_SCRAPE_INDEX, (i + 1) as u64);
            self.store.persist(state).await?;
        }

        state.clear_checkpoint(CK_SCRAPE_INDEX);
        self.advance(state, StageStatus::WebScraped).await?;
        info!(
            scraped = pages.len(),
            attempted = hits.len().saturating_sub(start),
            "scraping complete"
        );
        Ok(pages)
    }

    async fn stage_chunk(
        &self,
        state: &mut RunState,
        pages: &[ScrapedPage],
    ) -> Result<Vec<ContentChunk>, DriverError> {
        if state.status >= StageStatus::ContentGathered {
            if let Some(chunks) = self
                .store
                .load_asset(&state.run_id, assets::CONTENT_CHUNKS)
                .await?
            {
                return Ok(chunks);
            }
        }

        let chunks = Chunker::new(self.config.max_chunk_chars).chunk_pages(pages);
        self.store
            .save_asset(&state.run_id, assets::CONTENT_CHUNKS, &chunks)
            .await?;
        self.advance(state, StageStatus::ContentGathered).await?;
        info!(chunks = chunks.len(), pages = pages.len(), "content chunked");
        Ok(chunks)
    }

    async fn stage_extract(
        &self,
        state: &mut RunState,
        parsed: &ParsedRequest,
        chunks: &[ContentChunk],
        required_topics: usize,
    ) -> Result<TopicAsset, DriverError> {
        let asset: TopicAsset = self
            .store
            .load_asset(&state.run_id, assets::EXTRACTED_TOPICS)
            .await?
            .unwrap_or_default();

        if state.status >= StageStatus::TopicsExtracted && asset.topics.len() >= required_topics {
            return Ok(asset);
        }

        let processed: HashSet<String> = asset.processed_chunks.iter().cloned().collect();
        let pending: Vec<(String, ContentChunk)> = chunks
            .iter()
            .filter(|c| !processed.contains(&c.id()))
            .map(|c| (c.id(), c.clone()))
            .collect();

        let seen: HashSet<String> = asset.topics.iter().map(|t| normalize_topic(t)).collect();
        let unique = Arc::new(AtomicUsize::new(asset.topics.len()));
        let sink = Arc::new(Mutex::new(TopicSink { asset, seen }));

        let stop = {
            let unique = Arc::clone(&unique);
            move || unique.load(Ordering::SeqCst) >= required_topics
        };

        let run_id = state.run_id.clone();
        let sampling = self.sampling();
        let outcomes = self
            .executor
            .run(
                pending,
                |_, chunk: ContentChunk| {
                    let sink = Arc::clone(&sink);
                    let unique = Arc::clone(&unique);
                    let run_id = run_id.clone();
                    async move {
                        let topics = prompts::extract_topics(
                            self.llm.as_ref(),
                            &chunk.text,
                            &parsed.language,
                            &parsed.domain,
                            sampling,
                        )
                        .await?;

                        // Commit: dedup, append, persist — one critical
                        // section so the stored asset is always a
                        // consistent prefix of this stage's output.
                        let mut sink = sink.lock().await;
                        sink.asset.processed_chunks.push(chunk.id());
                        let mut added = 0usize;
                        for topic in topics {
                            let key = normalize_topic(&topic);
                            if key.is_empty() {
                                continue;
                            }
                            if sink.seen.insert(key) {
                                sink.asset.topics.push(topic);
                                added += 1;
                            }
                        }
                        unique.store(sink.asset.topics.len(), Ordering::SeqCst);
                        self.store
                            .save_asset(&run_id, assets::EXTRACTED_TOPICS, &sink.asset)
                            .await?;
                        Ok::<usize, StageError>(added)
                    }
                },
                Some(&stop),
            )
            .await;

        fatal_failure(outcomes)?;

        let asset = sink.lock().await.asset.clone();
        self.store
            .save_asset(&state.run_id, assets::EXTRACTED_TOPICS, &asset)
            .await?;
        self.advance(state, StageStatus::TopicsExtracted).await?;
        info!(
            topics = asset.topics.len(),
            required = required_topics,
            "topic extraction complete"
        );
        Ok(asset)
    }

    async fn stage_generate(
        &self,
        state: &mut RunState,
        filter: &AdmissionFilter,
        parsed: &ParsedRequest,
        topics: &[String],
    ) -> Result<GenerationAsset, DriverError> {
        let target = parsed.sample_count;
        let asset: GenerationAsset = self
            .store
            .load_asset(&state.run_id, assets::SYNTHETIC_DATA)
            .await?
            .unwrap_or_default();

        if state.status >= StageStatus::DataGenerated && asset.records.len() >= target {
            return Ok(asset);
        }

        let completed: HashSet<String> = asset.completed_topics.iter().cloned().collect();
        let pending: Vec<(String, String)> = topics
            .iter()
            .filter(|t| !completed.contains(&normalize_topic(t)))
            .map(|t| (format!("topic:{t}"), t.clone()))
            .collect();

        let unique = Arc::new(AtomicUsize::new(asset.records.len()));
        let sink = Arc::new(Mutex::new(asset));

        let stop = {
            let unique = Arc::clone(&unique);
            move || unique.load(Ordering::SeqCst) >= target
        };

        let run_id = state.run_id.clone();
        let sampling = self.sampling();
        let outcomes = self
            .executor
            .run(
                pending,
                |_, topic: String| {
                    let sink = Arc::clone(&sink);
                    let unique = Arc::clone(&unique);
                    let run_id = run_id.clone();
                    async move {
                        let candidates = prompts::generate_records(
                            self.llm.as_ref(),
                            &topic,
                            parsed,
                            self.config.records_per_topic,
                            sampling,
                        )
                        .await?;

                        let mut sink = sink.lock().await;
                        sink.total_generated += candidates.len();
                        sink.completed_topics.push(normalize_topic(&topic));
                        let mut admitted = 0usize;
                        for content in candidates {
                            match filter.admit_content(&content) {
                                Ok(_) => {
                                    sink.records.push(SyntheticRecord::new(content, &topic));
                                    admitted += 1;
                                }
                                Err(reason) => {
                                    debug!(topic = %topic, %reason, "generated record rejected")
                                }
                            }
                        }
                        unique.store(sink.records.len(), Ordering::SeqCst);
                        self.store
                            .save_asset(&run_id, assets::SYNTHETIC_DATA, &*sink)
                            .await?;
                        Ok::<usize, StageError>(admitted)
                    }
                },
                Some(&stop),
            )
            .await;

        fatal_failure(outcomes)?;

        let asset = sink.lock().await.clone();
        self.store
            .save_asset(&state.run_id, assets::SYNTHETIC_DATA, &asset)
            .await?;
        self.advance(state, StageStatus::DataGenerated).await?;
        info!(
            records = asset.records.len(),
            target,
            total_generated = asset.total_generated,
            "record generation complete"
        );
        Ok(asset)
    }

    async fn stage_finalize(
        &self,
        state: &mut RunState,
        parsed: &ParsedRequest,
        generated: &GenerationAsset,
    ) -> Result<FinalDataset, DriverError> {
        let dataset = export::assemble(parsed, &generated.records, generated.total_generated);
        self.store
            .save_asset(&state.run_id, assets::FINAL_DATASET, &dataset)
            .await?;

        if dataset.metadata.actual_count >= parsed.sample_count {
            self.advance(state, StageStatus::Completed).await?;
        } else {
            // Below target: the artifact exists, but the run stays at
            // data_generated so a later invocation can resume it.
            state.updated_at = Utc::now();
            self.store.persist(state).await?;
        }

        info!(
            run_id = %state.run_id,
            delivered = dataset.metadata.actual_count,
            requested = dataset.metadata.requested_count,
            completion_rate = %dataset.metadata.completion_rate,
            "final dataset assembled"
        );
        Ok(dataset)
    }
}

/// Lowercased, whitespace-normalized topic key used for uniqueness.
fn normalize_topic(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Escalates the fatal per-item failures: store write errors always, and
/// quota conditions that exhausted the whole credential pool.
fn fatal_failure<T>(outcomes: Vec<WorkOutcome<T, StageError>>) -> Result<(), DriverError> {
    for outcome in outcomes {
        match outcome.result {
            Err(StageError::Store(e)) => return Err(DriverError::Store(e)),
            Err(StageError::Llm(e)) if e.is_quota() => return Err(DriverError::Llm(e)),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("  Insulin   Dosing "), "insulin dosing");
        assert_eq!(normalize_topic("HbA1c\tTargets"), "hba1c targets");
        assert_eq!(normalize_topic(""), "");
    }

    #[test]
    fn test_fatal_failure_ignores_per_item_errors() {
        let outcomes = vec![
            WorkOutcome::<usize, StageError> {
                index: 0,
                label: "a".to_string(),
                result: Ok(1),
            },
            WorkOutcome {
                index: 1,
                label: "b".to_string(),
                result: Err(StageError::Llm(LlmError::StructuredContent(
                    "no json".to_string(),
                ))),
            },
        ];
        assert!(fatal_failure(outcomes).is_ok());
    }

    #[test]
    fn test_fatal_failure_escalates_credential_exhaustion() {
        let outcomes = vec![WorkOutcome::<usize, StageError> {
            index: 0,
            label: "a".to_string(),
            result: Err(StageError::Llm(LlmError::CredentialsExhausted {
                pool_size: 2,
                attempts: 6,
            })),
        }];
        assert!(matches!(
            fatal_failure(outcomes),
            Err(DriverError::Llm(LlmError::CredentialsExhausted { .. }))
        ));
    }

    #[test]
    fn test_fatal_failure_escalates_store_errors() {
        let outcomes = vec![WorkOutcome::<usize, StageError> {
            index: 0,
            label: "a".to_string(),
            result: Err(StageError::Store(StoreError::UnknownRun(
                "gone".to_string(),
            ))),
        }];
        assert!(matches!(
            fatal_failure(outcomes),
            Err(DriverError::Store(_))
        ));
    }
}

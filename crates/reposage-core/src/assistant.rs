//! Facade over indexing, retrieval and conversation memory, keyed by session.

use std::sync::Arc;

use reposage_index::repo_map::directory_tree;
use reposage_index::{
    AssemblerConfig, BuildReport, CodeRetriever, ContextAssembler, EmbeddingIndex, IndexerConfig,
    RepoIndexer, RetrievalConfig, SourceFile, extract_scope,
};
use reposage_llm::{CompletionOptions, HeuristicTokenizer, LlmProvider, Tokenizer};
use reposage_memory::{ConversationMemory, NO_PRIOR_CONVERSATION, SaveOutcome, VectorStore};

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::prompt::{
    SYSTEM_PROMPT_MODIFY, SYSTEM_PROMPT_QA, build_answer_prompt, build_modify_prompt,
    is_full_file_request, parse_code_response,
};
use crate::session::{InMemorySessionStore, SessionRecord, SessionStore};

/// Context selected for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAnswer {
    /// Text to hand to the completion call. Empty when nothing was selected.
    pub context_used: String,
    /// Chunk ids in inclusion order. Empty for whole-file contexts.
    pub chunk_ids: Vec<String>,
    /// Paths included whole instead of as chunks.
    pub full_files: Vec<String>,
    pub used_tokens: usize,
    pub budget: usize,
    pub over_budget: bool,
    pub directory_structure: String,
}

/// Generated answer plus the context it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub query: QueryAnswer,
}

/// Parsed code-modification completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEdit {
    /// File named in the completion header, if any.
    pub file_name: Option<String>,
    pub code: String,
    pub raw: String,
}

pub struct RepoAssistant<P> {
    provider: Arc<P>,
    /// Embeds and tags chunks and questions. Same as `provider` unless overridden.
    index_provider: Arc<P>,
    index: Arc<EmbeddingIndex>,
    tokenizer: Arc<dyn Tokenizer>,
    indexer: RepoIndexer<P>,
    retriever: CodeRetriever<P>,
    memory: ConversationMemory<P>,
    sessions: Arc<dyn SessionStore>,
    indexer_config: IndexerConfig,
    retrieval_config: RetrievalConfig,
    assembler_config: AssemblerConfig,
    answer_options: CompletionOptions,
}

impl<P> std::fmt::Debug for RepoAssistant<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoAssistant")
            .field("indexer", &self.indexer)
            .field("retriever", &self.retriever)
            .field("memory", &self.memory)
            .field("answer_options", &self.answer_options)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> RepoAssistant<P> {
    /// Assistant storing repository chunks and conversation memory in `store`.
    ///
    /// `provider` embeds, tags and answers. Use [`Self::with_index_provider`] to run
    /// indexing and retrieval on a different model.
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<dyn VectorStore>, config: &Config) -> Self {
        let index = Arc::new(EmbeddingIndex::new(
            Arc::clone(&store),
            config.index.collection_prefix.clone(),
        ));
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(HeuristicTokenizer::default());
        let indexer_config = config.indexer_config();
        let retrieval_config = config.retrieval_config();
        let assembler_config = config.assembler_config();

        let indexer = RepoIndexer::new(
            Arc::clone(&provider),
            Arc::clone(&index),
            Arc::clone(&tokenizer),
            indexer_config.clone(),
        );
        let retriever = CodeRetriever::new(
            Arc::clone(&provider),
            Arc::clone(&index),
            ContextAssembler::new(Arc::clone(&tokenizer), assembler_config.clone()),
            retrieval_config.clone(),
        );
        let memory = ConversationMemory::new(store, Arc::clone(&provider), config.memory_config());

        Self {
            index_provider: Arc::clone(&provider),
            provider,
            index,
            tokenizer,
            indexer,
            retriever,
            memory,
            sessions: Arc::new(InMemorySessionStore::new()),
            indexer_config,
            retrieval_config,
            assembler_config,
            answer_options: CompletionOptions::new(
                config.llm.answer_max_tokens,
                config.llm.answer_temperature,
            ),
        }
    }

    /// Use `index_provider` for everything indexing and retrieval send to a model:
    /// chunk embeddings, chunk role tags, question embeddings and question intent tags.
    ///
    /// Answers, code edits and conversation memory stay on the primary provider.
    #[must_use]
    pub fn with_index_provider(mut self, index_provider: Arc<P>) -> Self {
        self.index_provider = index_provider;
        self.rewire();
        self
    }

    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self.rewire();
        self
    }

    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    fn rewire(&mut self) {
        self.indexer = RepoIndexer::new(
            Arc::clone(&self.index_provider),
            Arc::clone(&self.index),
            Arc::clone(&self.tokenizer),
            self.indexer_config.clone(),
        );
        self.retriever = CodeRetriever::new(
            Arc::clone(&self.index_provider),
            Arc::clone(&self.index),
            ContextAssembler::new(Arc::clone(&self.tokenizer), self.assembler_config.clone()),
            self.retrieval_config.clone(),
        );
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id)
    }

    #[must_use]
    pub fn memory(&self) -> &ConversationMemory<P> {
        &self.memory
    }

    /// Index `files` under `session_id`, replacing any earlier build of it.
    ///
    /// # Errors
    ///
    /// Returns an error if every embedding fails or the vector store rejects the writes.
    pub async fn build(&self, session_id: &str, files: Vec<SourceFile>) -> Result<BuildReport> {
        if self.index.exists(session_id).await? {
            tracing::info!(session_id, "dropping previous index before rebuild");
            self.index.delete(session_id).await?;
        }
        let report = self.indexer.build(session_id, &files).await?;
        let directory_structure = directory_tree(files.iter().map(|f| f.path.as_str()));

        self.sessions.create(SessionRecord {
            session_id: session_id.to_owned(),
            files,
            directory_structure,
            report: report.clone(),
            queries: 0,
        });
        tracing::info!(
            session_id,
            chunks = report.chunk_count,
            files = report.files_indexed,
            "session ready"
        );
        Ok(report)
    }

    /// Context for `question`: the requested files whole when the question asks
    /// for them and they fit, otherwise ranked and budgeted chunks.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the session is unknown, its collection is
    /// missing or empty, or the question cannot be embedded.
    pub async fn answer_query(
        &self,
        session_id: &str,
        question: &str,
    ) -> std::result::Result<QueryAnswer, QueryError> {
        self.select_context(session_id, question, is_full_file_request(question))
            .await
    }

    async fn select_context(
        &self,
        session_id: &str,
        question: &str,
        prefer_full_files: bool,
    ) -> std::result::Result<QueryAnswer, QueryError> {
        let Some(record) = self.sessions.get(session_id) else {
            tracing::warn!(session_id, "query for unknown session");
            return Err(QueryError::session_not_found(session_id));
        };
        self.sessions.update(session_id, &mut |r| r.queries += 1);

        let budget = self.retriever.assembler().max_context_tokens(question);
        if prefer_full_files
            && let Some(answer) = self.full_file_context(&record, question, budget)
        {
            return Ok(answer);
        }

        let retrieved = self
            .retriever
            .retrieve_with_budget(session_id, question, budget)
            .await
            .map_err(|e| {
                let err = QueryError::from(e);
                tracing::warn!(session_id, code = %err.code, "query failed: {}", err.message);
                err
            })?;
        let context = retrieved.context;
        Ok(QueryAnswer {
            context_used: context.text,
            chunk_ids: context.chunk_ids,
            full_files: Vec::new(),
            used_tokens: context.used_tokens,
            budget: context.budget,
            over_budget: context.over_budget,
            directory_structure: record.directory_structure,
        })
    }

    fn full_file_context(
        &self,
        record: &SessionRecord,
        question: &str,
        budget: usize,
    ) -> Option<QueryAnswer> {
        let scope = extract_scope(question);
        let mut paths: Vec<&str> = Vec::new();
        let mut parts = Vec::new();
        for name in &scope.files {
            let Some(file) = record.find_file(name) else {
                continue;
            };
            if paths.contains(&file.path.as_str()) {
                continue;
            }
            paths.push(&file.path);
            parts.push(format!("// FILE: {}\n{}", file.path, file.content));
        }
        if parts.is_empty() {
            return None;
        }

        let text = parts.join("\n\n");
        let used_tokens = self.tokenizer.count(&text);
        if used_tokens > budget {
            tracing::debug!(
                session_id = %record.session_id,
                used_tokens,
                budget,
                "requested files exceed the budget, assembling chunks instead"
            );
            return None;
        }
        Some(QueryAnswer {
            context_used: text,
            chunk_ids: Vec::new(),
            full_files: paths.into_iter().map(str::to_owned).collect(),
            used_tokens,
            budget,
            over_budget: false,
            directory_structure: record.directory_structure.clone(),
        })
    }

    /// Answer `question` from the repository and earlier conversation, then remember the exchange.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if context selection or the completion fails.
    pub async fn ask(&self, session_id: &str, question: &str) -> std::result::Result<Answer, QueryError> {
        let query = self.answer_query(session_id, question).await?;
        let recalled = match self.recall(session_id, question).await {
            Ok(recalled) => recalled,
            Err(e) => {
                tracing::warn!(session_id, "conversation recall failed: {e}");
                NO_PRIOR_CONVERSATION.to_owned()
            }
        };

        let prompt = build_answer_prompt(
            &query.directory_structure,
            &query.context_used,
            question,
            Some(&recalled),
        );
        let text = self
            .provider
            .complete(&format!("{SYSTEM_PROMPT_QA}\n\n{prompt}"), self.answer_options)
            .await
            .map_err(|e| QueryError::completion(&e))?;

        if let Err(e) = self.remember(session_id, question, &text).await {
            tracing::warn!(session_id, "failed to remember exchange: {e}");
        }
        Ok(Answer { text, query })
    }

    /// Ask for a modified version of the code `request` refers to.
    ///
    /// Files named in the request are sent whole when they fit the budget.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if context selection or the completion fails.
    pub async fn modify(&self, session_id: &str, request: &str) -> std::result::Result<CodeEdit, QueryError> {
        let query = self.select_context(session_id, request, true).await?;
        let prompt = build_modify_prompt(&query.directory_structure, &query.context_used, request);
        let raw = self
            .provider
            .complete(&format!("{SYSTEM_PROMPT_MODIFY}\n\n{prompt}"), self.answer_options)
            .await
            .map_err(|e| QueryError::completion(&e))?;
        let (file_name, code) = parse_code_response(&raw);
        Ok(CodeEdit {
            file_name,
            code,
            raw,
        })
    }

    /// Store a question/answer exchange in the session's conversation memory.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the question or a store call fails.
    pub async fn remember(&self, session_id: &str, question: &str, answer: &str) -> Result<SaveOutcome> {
        Ok(self.memory.save(session_id, question, answer).await?)
    }

    /// Earlier exchanges related to `question`, or the no-prior-conversation sentinel.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the question cannot be embedded or the store search fails.
    pub async fn recall(&self, session_id: &str, question: &str) -> std::result::Result<String, QueryError> {
        let top_k = self.memory.config().recall_top_k;
        Ok(self.memory.retrieve(session_id, question, top_k).await?)
    }

    /// Forget `session_id`: its record, its repository index and its conversation memory.
    ///
    /// Returns whether a session record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if either collection cannot be deleted.
    pub async fn reset(&self, session_id: &str) -> Result<bool> {
        let existed = self.sessions.evict(session_id).is_some();
        self.index.delete(session_id).await?;
        self.memory.reset(session_id).await?;
        tracing::info!(session_id, existed, "session reset");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use reposage_llm::mock::MockProvider;
    use reposage_memory::InMemoryVectorStore;

    use super::*;
    use crate::error::ErrorCode;

    fn assistant(mock: MockProvider) -> RepoAssistant<MockProvider> {
        RepoAssistant::new(
            Arc::new(mock),
            Arc::new(InMemoryVectorStore::new()),
            &Config::default(),
        )
    }

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new(
                "src/auth.py",
                "def login(user, password):\n    if not user:\n        return False\n    return check(user, password)\n",
            ),
            SourceFile::new("src/main.py", "def main():\n    serve()\n"),
        ]
    }

    #[tokio::test]
    async fn build_records_session() {
        let assistant = assistant(MockProvider::bag_of_words(64));
        let report = assistant.build("s1", files()).await.unwrap();
        assert_eq!(report.chunk_count, 2);

        let record = assistant.session("s1").unwrap();
        assert_eq!(record.chunk_count(), 2);
        assert_eq!(record.directory_structure, "src/\n  auth.py\n  main.py");
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_index() {
        let assistant = assistant(MockProvider::bag_of_words(64));
        assistant.build("s1", files()).await.unwrap();
        let report = assistant.build("s1", files()).await.unwrap();
        assert_eq!(report.chunk_count, 2);
        assert_eq!(assistant.index.count("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_session_is_structured_error() {
        let assistant = assistant(MockProvider::default());
        let err = assistant.answer_query("nope", "anything").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn query_counts_are_tracked() {
        let assistant = assistant(MockProvider::bag_of_words(64));
        assistant.build("s1", files()).await.unwrap();
        assistant.answer_query("s1", "how does login work").await.unwrap();
        assistant.answer_query("s1", "where is main").await.unwrap();
        assert_eq!(assistant.session("s1").unwrap().queries, 2);
    }

    #[tokio::test]
    async fn full_file_request_returns_whole_file() {
        let assistant = assistant(MockProvider::bag_of_words(64));
        assistant.build("s1", files()).await.unwrap();
        let answer = assistant
            .answer_query("s1", "show me the full code of auth.py")
            .await
            .unwrap();
        assert_eq!(answer.full_files, vec!["src/auth.py"]);
        assert!(answer.chunk_ids.is_empty());
        assert!(answer.context_used.starts_with("// FILE: src/auth.py\ndef login("));
    }

    #[tokio::test]
    async fn oversized_full_file_falls_back_to_chunks() {
        let mut config = Config::default();
        config.assembler.model_context_window = 2200;
        config.assembler.reserved_response_tokens = 2048;
        let assistant = RepoAssistant::new(
            Arc::new(MockProvider::bag_of_words(64)),
            Arc::new(InMemoryVectorStore::new()),
            &config,
        );
        let big = "x = 1\n".repeat(200);
        assistant
            .build("s1", vec![SourceFile::new("big.py", big)])
            .await
            .unwrap();
        let answer = assistant
            .answer_query("s1", "full code of big.py")
            .await
            .unwrap();
        assert!(answer.full_files.is_empty());
        assert!(!answer.chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn modify_parses_file_header() {
        let mock = MockProvider::bag_of_words(64)
            .with_default_response("// FILE: src/main.py\ndef main():\n    serve(port=80)\n");
        let assistant = assistant(mock);
        assistant.build("s1", files()).await.unwrap();
        let edit = assistant
            .modify("s1", "make main.py serve on port 80")
            .await
            .unwrap();
        assert_eq!(edit.file_name.as_deref(), Some("src/main.py"));
        assert_eq!(edit.code, "def main():\n    serve(port=80)");
    }

    #[tokio::test]
    async fn index_provider_serves_indexing_and_retrieval_only() {
        let primary = MockProvider::bag_of_words(64).with_default_response("login checks the password");
        let indexing = MockProvider::bag_of_words(64);
        let assistant = assistant(primary.clone()).with_index_provider(Arc::new(indexing.clone()));

        assistant.build("s1", files()).await.unwrap();
        assert_eq!(primary.embed_calls(), 0);
        assert_eq!(primary.complete_calls(), 0);
        assert_eq!(indexing.embed_calls(), 2);
        assert!(indexing.complete_calls() >= 2);

        assistant.ask("s1", "how does login work?").await.unwrap();
        assert_eq!(indexing.embed_calls(), 3);
        assert_eq!(primary.complete_calls(), 1);
        // only the memory save embeds on the primary provider
        assert_eq!(primary.embed_calls(), 1);
    }

    #[tokio::test]
    async fn ask_remembers_the_exchange() {
        let mock = MockProvider::bag_of_words(64).with_default_response("login checks the password");
        let assistant = assistant(mock);
        assistant.build("s1", files()).await.unwrap();

        let answer = assistant.ask("s1", "how does login work?").await.unwrap();
        assert_eq!(answer.text, "login checks the password");
        let entries = assistant.memory().entries("s1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_question, "how does login work?");
    }

    #[tokio::test]
    async fn failed_completion_is_completion_error() {
        let assistant = assistant(MockProvider::bag_of_words(64).failing_completions());
        assistant.build("s1", files()).await.unwrap();
        let err = assistant.ask("s1", "how does login work?").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CompletionError);
    }

    #[tokio::test]
    async fn reset_forgets_everything() {
        let assistant = assistant(MockProvider::bag_of_words(64));
        assistant.build("s1", files()).await.unwrap();
        assistant
            .remember("s1", "how does login work", "it checks the password")
            .await
            .unwrap();

        assert!(assistant.reset("s1").await.unwrap());
        assert!(assistant.session("s1").is_none());
        assert!(!assistant.index.exists("s1").await.unwrap());
        assert_eq!(
            assistant.recall("s1", "how does login work").await.unwrap(),
            NO_PRIOR_CONVERSATION
        );
        assert!(!assistant.reset("s1").await.unwrap());
    }
}

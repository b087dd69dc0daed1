use std::sync::Arc;

use reposage_core::{Config, ErrorCode, RepoAssistant};
use reposage_index::SourceFile;
use reposage_llm::mock::MockProvider;
use reposage_memory::{InMemoryVectorStore, NO_PRIOR_CONVERSATION, SaveOutcome, VectorStore};

fn repo_files() -> Vec<SourceFile> {
    vec![
        SourceFile::new(
            "server/auth.js",
            "function login(user, password) {\n  if (!user) {\n    return false;\n  }\n  return verify(user, password);\n}\n",
        ),
        SourceFile::new(
            "server/index.js",
            "function main() {\n  const app = createApp();\n  app.listen(8080);\n}\n",
        ),
        SourceFile::new("README.md", "# Demo\nLogin and entry point example.\n"),
    ]
}

fn setup(mock: MockProvider, config: &Config) -> (RepoAssistant<MockProvider>, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let assistant = RepoAssistant::new(Arc::new(mock), Arc::clone(&store) as Arc<dyn VectorStore>, config);
    (assistant, store)
}

#[tokio::test]
async fn recall_returns_only_the_related_conversation() {
    let mock = MockProvider::default();
    mock.set_vector("로그인 함수는 어떻게 동작해", vec![1.0, 0.2, 0.0, 0.0]);
    mock.set_vector("메인 진입점은 어디인가요", vec![0.0, 0.0, 1.0, 0.0]);
    mock.set_vector("로그인 함수는 어떻게 작동하나요", vec![0.95, 0.25, 0.1, 0.0]);
    let (assistant, _) = setup(mock, &Config::default());

    assistant
        .remember("s1", "로그인 함수는 어떻게 동작해?", "login()은 사용자와 비밀번호를 검증합니다.")
        .await
        .unwrap();
    assistant
        .remember("s1", "메인 진입점은 어디인가요?", "server/index.js의 main()입니다.")
        .await
        .unwrap();

    let recalled = assistant
        .recall("s1", "로그인 함수는 어떻게 작동하나요?")
        .await
        .unwrap();
    assert_ne!(recalled, NO_PRIOR_CONVERSATION);
    assert!(recalled.starts_with("[related #1 (similarity: 0.99)]"));
    assert!(recalled.contains("Q: 로그인 함수는 어떻게 동작해?"));
    assert!(!recalled.contains("메인"));
    assert!(!recalled.contains("[related #2"));
}

#[tokio::test]
async fn same_exchange_twice_is_stored_once() {
    let (assistant, _) = setup(MockProvider::bag_of_words(32), &Config::default());
    let first = assistant
        .remember("s1", "How does login work?", "It verifies the password.")
        .await
        .unwrap();
    let second = assistant
        .remember("s1", "how does LOGIN work", "It verifies the password.")
        .await
        .unwrap();
    assert_eq!(first, SaveOutcome::Inserted { replaced: 0 });
    assert_eq!(second, SaveOutcome::Duplicate);
    assert_eq!(assistant.memory().entries("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn near_duplicates_collapse_for_each_threshold() {
    for threshold in [0.91, 0.93, 0.95] {
        let mock = MockProvider::default();
        mock.set_vector("where is the entry point", vec![1.0, 0.0, 0.0, 0.0]);
        mock.set_vector("where is the main entry point", vec![1.0, 0.1, 0.0, 0.0]);
        mock.set_vector("how is the app configured", vec![1.0, 0.6, 0.0, 0.0]);
        let mut config = Config::default();
        config.memory.dedup_threshold = threshold;
        let (assistant, _) = setup(mock, &config);

        assistant
            .remember("s1", "Where is the entry point?", "main()")
            .await
            .unwrap();
        let outcome = assistant
            .remember("s1", "Where is the main entry point?", "main() in index.js")
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted { replaced: 1 }, "threshold {threshold}");

        assistant
            .remember("s1", "How is the app configured?", "createApp()")
            .await
            .unwrap();
        let entries = assistant.memory().entries("s1").await.unwrap();
        assert_eq!(entries.len(), 2, "threshold {threshold}");
        assert_eq!(entries[0].original_question, "Where is the main entry point?");
    }
}

#[tokio::test]
async fn answer_query_ranks_the_scoped_function_first() {
    let (assistant, _) = setup(MockProvider::bag_of_words(128), &Config::default());
    let report = assistant.build("s1", repo_files()).await.unwrap();
    assert_eq!(report.chunk_count, 3);

    let answer = assistant
        .answer_query("s1", "로그인 login 함수는 어떻게 password를 확인하나요?")
        .await
        .unwrap();
    assert_eq!(answer.chunk_ids[0], "server/auth.js_0");
    assert!(answer.context_used.contains("[file: server/auth.js / function: login"));
    assert!(answer.used_tokens <= answer.budget);
    assert!(!answer.over_budget);
    assert_eq!(
        answer.directory_structure,
        "server/\n  auth.js\n  index.js\nREADME.md"
    );
}

#[tokio::test]
async fn missing_collection_is_reported_with_code() {
    let (assistant, store) = setup(MockProvider::bag_of_words(64), &Config::default());
    assistant.build("s1", repo_files()).await.unwrap();
    store.delete_collection("repo_s1").await.unwrap();

    let err = assistant.answer_query("s1", "where is main?").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CollectionNotFound);
    assert!(err.message.contains("analyze the repository again"));
}

#[tokio::test]
async fn empty_collection_is_reported_with_code() {
    let (assistant, store) = setup(MockProvider::bag_of_words(64), &Config::default());
    let report = assistant.build("s2", Vec::new()).await.unwrap();
    assert_eq!(report.chunk_count, 0);
    store.ensure_collection("repo_s2", 64).await.unwrap();

    let err = assistant.answer_query("s2", "anything").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::EmptyCollection);
}

#[tokio::test]
async fn embedding_outage_is_embedding_error() {
    let mock = MockProvider::bag_of_words(64).fail_embed_containing("outage");
    let (assistant, _) = setup(mock, &Config::default());
    assistant.build("s1", repo_files()).await.unwrap();

    let err = assistant
        .answer_query("s1", "what happens during an outage?")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EmbeddingError);
}

#[tokio::test]
async fn build_with_every_embedding_failing_is_an_error() {
    let (assistant, _) = setup(MockProvider::default().failing_embeddings(), &Config::default());
    let err = assistant.build("s1", repo_files()).await.unwrap_err();
    assert!(err.to_string().contains("all 3 of 3 embeddings failed"));
    assert!(assistant.session("s1").is_none());
}

#[tokio::test]
async fn ask_uses_recalled_conversation_and_stores_answer() {
    let mock = MockProvider::bag_of_words(128).with_default_response("main() starts the server on 8080");
    let (assistant, _) = setup(mock, &Config::default());
    assistant.build("s1", repo_files()).await.unwrap();

    let first = assistant.ask("s1", "where is the main entry point?").await.unwrap();
    assert_eq!(first.text, "main() starts the server on 8080");

    let recalled = assistant
        .recall("s1", "where is the main entry point?")
        .await
        .unwrap();
    assert!(recalled.contains("A: main() starts the server on 8080"));
}

use std::fmt::Write as _;
use std::sync::Arc;

use reposage_index::{
    AssemblerConfig, ChunkType, ChunkerConfig, CodeRetriever, ContextAssembler, EmbeddingIndex,
    IndexError, IndexerConfig, RepoIndexer, RetrievalConfig, SourceChunker, SourceFile,
};
use reposage_llm::HeuristicTokenizer;
use reposage_llm::mock::MockProvider;
use reposage_memory::InMemoryVectorStore;

fn chunker() -> SourceChunker {
    SourceChunker::new(Arc::new(HeuristicTokenizer::default()), ChunkerConfig::default())
}

fn big_python_class() -> String {
    let mut src = String::from("import os\n\nclass Service:\n");
    for name in ["load", "save", "sync"] {
        let _ = writeln!(src, "    def {name}(self):");
        for i in 0..30 {
            let _ = writeln!(src, "        value_{i} = os.getenv('KEY_{i}', 'default')");
        }
        src.push('\n');
    }
    src
}

#[cfg(feature = "lang-python")]
#[test]
fn small_function_is_one_chunk() {
    let src = "def greet(name):\n    message = 'hello ' + name\n    print(message)\n    return message\n";
    let chunks = chunker().chunk("app/greet.py", src);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_type, ChunkType::Function);
    assert_eq!(chunks[0].complexity, 2);
    assert_eq!(chunks[0].id, "app/greet.py_0");
}

#[cfg(feature = "lang-python")]
#[test]
fn large_class_starts_with_header_chunk() {
    let chunks = chunker().chunk("app/service.py", &big_python_class());
    let class_chunks: Vec<_> = chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Class)
        .collect();
    assert!(class_chunks.len() >= 3);
    assert!(class_chunks[0].text.starts_with("import os"));
    assert!(class_chunks[0].text.ends_with("class Service:"));
    assert!(
        chunks
            .iter()
            .all(|c| c.class_name.as_deref() == Some("Service"))
    );
    assert!(chunks.iter().all(|c| c.token_count <= 512));
    assert!(chunks.iter().all(|c| c.end_line >= c.start_line));
}

#[test]
fn chunking_is_deterministic_across_kinds() {
    let files = [
        ("a.py", big_python_class()),
        ("b.js", "function f(a) {\n  return a + 1;\n}\n".to_owned()),
        ("c.md", "# Title\nSome text.\n".to_owned()),
        ("d.cfg", "key = value\n".repeat(200)),
    ];
    for (path, text) in &files {
        assert_eq!(chunker().chunk(path, text), chunker().chunk(path, text), "{path}");
    }
}

#[tokio::test]
async fn query_for_unbuilt_session_is_collection_not_found() {
    let index = EmbeddingIndex::new(Arc::new(InMemoryVectorStore::new()), "repo_");
    let err = index.query("missing", vec![1.0, 0.0], 5).await.unwrap_err();
    assert!(matches!(err, IndexError::CollectionNotFound(_)));
    assert!(err.to_string().contains("analyze the repository again"));
}

#[tokio::test]
async fn build_then_retrieve_end_to_end() {
    let provider = Arc::new(MockProvider::bag_of_words(128));
    let index = Arc::new(EmbeddingIndex::new(Arc::new(InMemoryVectorStore::new()), "repo_"));
    let tokenizer = Arc::new(HeuristicTokenizer::default());

    let indexer = RepoIndexer::new(
        Arc::clone(&provider),
        Arc::clone(&index),
        tokenizer.clone(),
        IndexerConfig::default(),
    );
    let files = vec![
        SourceFile::new(
            "web/auth.js",
            "function login(user, password) {\n  if (!user) {\n    return false;\n  }\n  return check(user, password);\n}\n",
        ),
        SourceFile::new(
            "web/main.js",
            "function main() {\n  start();\n  listen(8080);\n}\n",
        ),
        SourceFile::new("README.md", "# Project\nA small web app.\n"),
    ];
    let report = indexer.build("s1", &files).await.unwrap();
    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.files_indexed, 3);
    assert_eq!(index.count("s1").await.unwrap(), 3);

    let retriever = CodeRetriever::new(
        provider,
        index,
        ContextAssembler::new(tokenizer, AssemblerConfig::default()),
        RetrievalConfig::default(),
    );
    let out = retriever
        .retrieve("s1", "how does the login function check the password?")
        .await
        .unwrap();
    assert_eq!(out.scope.functions, vec!["login"]);
    assert_eq!(out.ranked[0].chunk.function_name.as_deref(), Some("login"));
    assert_eq!(out.context.chunk_ids[0], "web/auth.js_0");
    assert!(
        out.context
            .text
            .contains("[file: web/auth.js / function: login / lines: 1~6")
    );
    assert!(out.context.used_tokens <= out.context.budget);
}

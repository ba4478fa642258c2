pub mod db;
pub mod portrait;
pub mod suggestions_llm;
pub mod tale_llm;

pub use db::DbAdapter;
pub use portrait::GeminiPortraitAdapter;
pub use suggestions_llm::OpenAiSuggestionAdapter;
pub use tale_llm::OpenAiTaleAdapter;

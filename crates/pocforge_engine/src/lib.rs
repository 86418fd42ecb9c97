//! PocForge engine: evidence collection, model requests, template files,
//! the catalog and the scanner process.
mod assemble;
mod catalog;
mod collect;
mod decode;
mod extract;
mod fetch;
mod generate;
mod llm;
mod page;
mod persist;
mod scan;
mod session;
pub mod sources;
mod types;

pub use assemble::{AssembleError, AssembledTemplate, TemplateStore, TEMPLATE_EXTENSION};
pub use catalog::{
    Catalog, CatalogEntry, CatalogError, EntryUpdate, ExportReport, NewEntry, SearchQuery,
};
pub use collect::{
    run_collection, ChannelEventSink, CollectionPlan, CollectionRun, Collector, CollectorSettings,
    EventSink, EXTRACTED_HEADING,
};
pub use decode::{decode_body, DecodedText};
pub use extract::{poc_text_from_html, ContentExtractor, PocTextExtractor};
pub use fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
pub use generate::{GenerationEvent, GenerationHandle, Generator};
pub use llm::{
    ApiKey, ChatCompletionsClient, GenerativeClient, LlmError, LlmSettings, DEFAULT_API_URL,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT,
};
pub use page::{HtmlPage, PageElement, PageQuery, Query, TextMatch};
pub use persist::{ensure_output_dir, write_atomic, AtomicFileWriter, PersistError};
pub use scan::{ScanError, ScanLine, ScanRequest, ScanRunner, DEFAULT_SCANNER};
pub use session::{
    BrowserSession, LoadedPage, NavigateError, ReqwestSessionFactory, SessionError,
    SessionFactory,
};
pub use types::{
    CollectError, CollectionEvent, FailureKind, FetchError, FetchMetadata, FetchOutput,
};

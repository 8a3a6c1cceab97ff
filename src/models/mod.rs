//! Models
//!
//! Documents, typed records, queries and updates shared by the cache, the
//! remote store and the data service, plus the HTTP request/response DTOs.

pub mod batch;
pub mod document;
pub mod query;
pub mod records;
pub mod requests;
pub mod responses;
pub mod update;

// Re-export commonly used types
pub use batch::BatchOperation;
pub use document::{is_reserved, Collection, Document, Fields, RESERVED_FIELDS};
pub use query::{Direction, Filter, FilterOp, OrderBy, Page, Pagination, Query};
pub use records::{
    from_document, record_fields, Attachment, Comment, DocumentFormat, Meta, OutputMessage,
    OutputRole, Permissions, Priority, Project, ProjectSettings, ProjectStatus, ProjectType,
    Record, Regulation, Requirement, RequirementAnalysis, RequirementFormat, TaskStatus,
};
pub use requests::{AnalysisStartRequest, BatchRequest, QueryRequest, SelectRequest};
pub use responses::{
    AnalysisStartedResponse, AnalysisStatusResponse, BatchResponse, CacheStatsResponse,
    DeleteResponse, HealthResponse, InvalidateResponse, LastErrorResponse, SelectionResponse,
};
pub use update::{FieldOp, FieldOperation, Patch, Update};

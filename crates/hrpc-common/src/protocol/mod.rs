pub mod error;
pub mod params;
pub mod requests;
pub mod responses;


pub use error::{HrpcError, Result};
pub use params::{Params, WireType};
pub use requests::{next_request_id, MethodName, Request, RequestId, ServiceName, UNASSIGNED_REQUEST_ID};
pub use responses::{RemoteError, RemoteErrorKind, Response, ResponseBody};

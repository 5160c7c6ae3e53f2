mod impls;
mod oracle;
mod requests;
mod responses;

pub use impls::*;
pub use oracle::*;
pub use requests::*;
pub use responses::*;

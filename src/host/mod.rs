/// Host Runtime Module
///
/// The host side of the binding layer: the values a scripting runtime
/// exchanges with SQL, the explicit local scope used for caller-local
/// binding, and the registry of host-visible object kinds.
pub mod registry;
pub mod scope;
pub mod value;

pub use registry::{registry, Registry, Runtime, TypeDescriptor, Userdata, DB_TYPE, STMT_TYPE};
pub use scope::LocalScope;
pub use value::{HostTable, HostValue, ObjectId, TableKey};

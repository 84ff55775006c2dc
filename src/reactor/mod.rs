pub mod master;
pub mod sub;

pub use master::MasterReactor;
pub use sub::SubReactor;

//! Ready-to-use hooks for [`Consumer`](crate::consumers::Consumer)s.
pub mod pre_start;

//! Small helpers shared by the serializer.

pub mod qname;

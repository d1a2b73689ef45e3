pub(crate) mod sse;

use serde::Serialize;
pub(crate) mod health_check_controller;
pub(crate) mod session_controller;

#[derive(Debug, Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    status_code: u16,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self { status_code, data }
    }
}

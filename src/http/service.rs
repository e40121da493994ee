use super::api::{reason_phrase, VersionApi};
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};
use std::sync::Arc;

/// Largest request body accepted by the verify endpoint
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// `may_minihttp` adapter for [`VersionApi`]
#[derive(Clone)]
pub struct VersionService {
    api: Arc<VersionApi>,
}

impl VersionService {
    pub fn new(api: Arc<VersionApi>) -> Self {
        Self { api }
    }
}

impl HttpService for VersionService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let target = req.path().to_string();

        let mut body = Vec::new();
        if method == "POST" {
            req.body().take(MAX_BODY_BYTES).read_to_end(&mut body)?;
        }

        let response = self.api.handle(&method, &target, &body);
        res.status_code(usize::from(response.status), reason_phrase(response.status));
        res.header(response.content_type);
        res.body_vec(response.body);
        Ok(())
    }
}

use async_trait::async_trait;
use hubwork_core::{decode_config, CanonicalRequest, ExecContext, HubResult, Task};
use serde_json::Value;

use crate::remote::{RemoteClient, RemoteHttpConfig};

/// Sends the request to a remote service and folds the reply back in.
///
/// In an outbound workflow the reply overwrites the attached response. In an
/// inbound workflow, where nothing is attached yet, the reply's body and
/// headers replace the request's own.
#[derive(Debug, Clone)]
pub struct RemoteHttpTask {
    client: RemoteClient,
}

impl RemoteHttpTask {
    /// Registered type name.
    pub const TYPE: &'static str = "remote_http";

    /// Factory entry point.
    pub fn from_config(config: &Value) -> HubResult<Self> {
        let config: RemoteHttpConfig = decode_config(Self::TYPE, config)?;
        Ok(Self {
            client: RemoteClient::new(Self::TYPE, config)?,
        })
    }
}

#[async_trait]
impl Task for RemoteHttpTask {
    fn name(&self) -> &str {
        Self::TYPE
    }

    async fn apply(&self, ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        let reply = ctx.run(self.client.forward(request)).await?;
        let status = reply.status()?;
        let headers = reply.header_map()?;

        if let Some(response) = request.response_mut() {
            response.set_status(status);
            *response.headers_mut() = headers;
            response.set_body(reply.body);
        } else {
            *request.headers_mut() = headers;
            request.set_body(reply.body);
        }
        tracing::debug!(request_id = %request.id(), status = status.as_u16(), "remote task applied");
        Ok(())
    }
}

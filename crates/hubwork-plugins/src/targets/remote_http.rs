use async_trait::async_trait;
use hubwork_core::{
    decode_config, CanonicalRequest, CanonicalResponse, ExecContext, HubResult, Target,
};
use serde_json::Value;

use crate::remote::{RemoteClient, RemoteHttpConfig};

/// Forwards the request envelope upstream and answers with the decoded reply.
#[derive(Debug, Clone)]
pub struct RemoteHttpTarget {
    client: RemoteClient,
}

impl RemoteHttpTarget {
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
impl Target for RemoteHttpTarget {
    async fn apply(
        &self,
        ctx: &ExecContext,
        request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        let reply = ctx.run(self.client.forward(request)).await?;
        Ok(Some(reply.into_response()?))
    }
}

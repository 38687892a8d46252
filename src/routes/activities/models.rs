use serde::Serialize;
use utoipa::ToSchema;

use crate::utils::activities::models::{Activity, CorrelationId, CreatedActivity};

/// Body of a successful submission. `was_deduplicated` tells the client the
/// activity already existed under the same idempotency key.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedActivityResponse {
    pub activity: Activity,
    pub was_deduplicated: bool,
    #[schema(value_type = String)]
    pub correlation_id: CorrelationId,
}

impl CreatedActivityResponse {
    pub fn new(created: CreatedActivity, correlation_id: CorrelationId) -> Self {
        Self {
            activity: created.activity,
            was_deduplicated: created.was_deduplicated,
            correlation_id,
        }
    }
}

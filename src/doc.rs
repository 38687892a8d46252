use crate::routes::activities::models::*;
use crate::routes::activities::*;
use crate::utils::activities::models::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
info(title = "Tripsync", description = "Group trip activity planning", ),
paths(
create_activity,
propose_activity,
),
components(schemas(
RawActivityPayload,
RawNumber,
RawId,
Category,
ActivityKind,
ActivityStatus,
InviteStatus,
Activity,
ActivityInvite,
CreatedActivityResponse,
)),
tags((name = "activities"))
)]
pub struct ApiDoc;

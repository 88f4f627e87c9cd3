use actix_web::{web, HttpResponse};

use crate::auth::BearerAuth;
use crate::error::AppResult;
use crate::models::MergeGroupsRequest;
use crate::services::MergeService;
use crate::tasks::TaskContext;

/// POST /api/projects/{project_id}/issues/merge
/// Queues a merge of the given groups into the one with the most events
pub async fn merge_issues(
    _auth: BearerAuth,
    ctx: web::Data<TaskContext>,
    path: web::Path<i64>,
    body: web::Json<MergeGroupsRequest>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();

    let response = MergeService::queue_merge(ctx.get_ref(), project_id, &body.group_ids).await?;

    Ok(HttpResponse::Accepted().json(response))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/projects/{project_id}/issues")
            .route("/merge", web::post().to(merge_issues)),
    );
}

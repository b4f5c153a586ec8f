use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "calcrawl API",
        version = "0.1.0",
        description = "Read access to calendar events collected from listing sites."
    ),
    paths(
        crate::routes::list_events,
        crate::routes::get_event,
        crate::routes::list_tags,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::EventResponse,
        crate::dto::EventListResponse,
        crate::dto::TagListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "events", description = "Stored events and their tags"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;

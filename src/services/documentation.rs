use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Planning Poker Back.
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::websocket::ws_handler,
        crate::routes::room::create_room,
        crate::routes::room::get_room,
        crate::routes::room::update_settings,
        crate::routes::room::join_room,
        crate::routes::room::edit_user,
        crate::routes::room::leave_room,
        crate::routes::room::pick_card,
        crate::routes::room::remove_card,
        crate::routes::room::show_cards,
        crate::routes::room::reset_game,
        crate::routes::room::set_active_story,
        crate::routes::room::submit_estimation,
        crate::routes::room::skip_story,
        crate::routes::room::send_reaction,
        crate::routes::room::get_activities,
        crate::routes::room::create_node,
        crate::routes::room::list_nodes,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::ActionResponse,
            crate::dto::room::ActivityView,
            crate::dto::room::CanvasNodeView,
            crate::dto::room::CreateNodeRequest,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::EditUserRequest,
            crate::dto::room::EstimationRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::NextStoryResponse,
            crate::dto::room::PickCardRequest,
            crate::dto::room::ReactionRequest,
            crate::dto::room::RoomSettingsPatch,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::RoomView,
            crate::dto::room::SetActiveStoryRequest,
            crate::dto::room::UserView,
            crate::dto::room::VoteView,
            crate::dao::models::NodeData,
            crate::dao::models::NodePosition,
            crate::dao::models::RoomType,
            crate::dao::models::VotingSystem,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lifecycle and settings"),
        (name = "users", description = "Membership and reactions"),
        (name = "voting", description = "Votes, reveal, and reset"),
        (name = "stories", description = "Active story and rotation"),
        (name = "canvas", description = "Canvas node operations"),
    )
)]
pub struct ApiDoc;

use utoipa::OpenApi;
use utoipa::openapi::security::{
    AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityRequirement,
    SecurityScheme,
};
use utoipa::openapi::server::ServerBuilder;

use crate::config::ServerConfig;

pub const OAUTH_SCHEME: &str = "GitHubOAuth";
pub const BEARER_SCHEME: &str = "bearer";

const OAUTH_SCOPES: [(&str, &str); 3] = [
    ("read:user", "Read user profile information"),
    ("user:email", "Read user email addresses"),
    ("repo", "Read and write repositories"),
];

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SQL Playground API",
        version = "1.0.0",
        description = "Secure SQL Playground API with GitHub OAuth integration for query execution and Git repository management",
        contact(
            name = "NSU SQLPlayground team",
            email = "a.kardash@g.nsu.ru",
            url = "https://www.nsu.ru/"
        ),
        license(name = "MIT License", url = "https://choosealicense.com/licenses/mit/")
    ),
    paths(
        crate::routes::execute_query,
        crate::routes::validate_query,
        crate::routes::query_history,
        crate::routes::schema,
        crate::routes::save_to_git,
        crate::routes::reset_sandbox,
        crate::routes::auth_status,
        crate::routes::profile,
        crate::routes::list_repositories,
        crate::routes::create_repository,
        crate::routes::commit_file,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::QueryRequest,
        crate::dto::QueryResponse,
        crate::dto::ColumnInfoResponse,
        crate::dto::HistoryEntryResponse,
        crate::dto::HistoryResponse,
        crate::dto::TableResponse,
        crate::dto::SchemaResponse,
        crate::dto::AuthStatusResponse,
        crate::dto::ProfileResponse,
        crate::dto::RepositoryResponse,
        crate::dto::CommitResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "SQL Playground", description = "Execute, validate and save SQL queries in a personal sandbox"),
        (name = "Authentication & Git Integration", description = "GitHub account and repository operations"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the Bearer token security scheme to the OpenAPI document.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                BEARER_SCHEME,
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("GitHub access token")
                        .description(Some(
                            "GitHub OAuth or personal access token, validated against the GitHub API.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// The OpenAPI document with servers and OAuth endpoints from configuration.
pub fn api_doc(config: &ServerConfig) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.servers = Some(vec![
        ServerBuilder::new()
            .url(&config.openapi_dev_url)
            .description(Some("Development server"))
            .build(),
        ServerBuilder::new()
            .url(&config.openapi_prod_url)
            .description(Some("Production server"))
            .build(),
    ]);

    let oauth = OAuth2::with_description(
        [Flow::AuthorizationCode(AuthorizationCode::new(
            &config.github_authorization_uri,
            &config.github_token_uri,
            Scopes::from_iter(OAUTH_SCOPES),
        ))],
        "GitHub OAuth2 Authentication",
    );
    doc.components
        .get_or_insert_with(Default::default)
        .add_security_scheme(OAUTH_SCHEME, SecurityScheme::OAuth2(oauth));

    doc.security = Some(vec![
        SecurityRequirement::new(OAUTH_SCHEME, OAUTH_SCOPES.map(|(scope, _)| scope)),
        SecurityRequirement::new(BEARER_SCHEME, Vec::<String>::new()),
    ]);

    doc
}

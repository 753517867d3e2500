//! Basic example of the Warren container.

use std::sync::Arc;

use warren::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
    debug: bool,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

impl Disposable for Database {
    fn dispose(&self) {
        self.logger.log(&format!("Closing {}", self.url));
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("warren_container=debug")
        .init();

    let config = Identifier::new("config");
    let logger = Identifier::new("logger");
    let database = Identifier::new("database");
    let repository = Identifier::new("user_repository");

    // Root scope: lives as long as the application
    let app = Scope::builder()
        .name("app")
        .with(
            &config,
            DependencyItem::value(Config {
                database_url: "postgres://localhost/myapp".to_string(),
                debug: true,
            }),
        )
        .with(&logger, DependencyItem::value(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
        .with(
            &database,
            DependencyItem::factory(vec![Dep::new(&config), Dep::new(&logger)], |args| {
                let config = args.required::<Config>(0)?;
                let logger = args.required::<Arc<dyn Logger>>(1)?;
                Ok(Instance::disposable(Database {
                    url: config.database_url.clone(),
                    logger: Arc::clone(logger.as_ref()),
                }))
            }),
        )
        .build();

    println!("✅ Scope built: {app}");

    let settings = app.get_as::<Config>(&config)?;
    println!("📋 Config: database_url={}, debug={}", settings.database_url, settings.debug);

    // === A child scope per request ===
    for request_id in [42, 7] {
        let request = Scope::builder()
            .name(format!("request-{request_id}"))
            .with(
                &repository,
                DependencyItem::factory(vec![Dep::new(&database)], |args| {
                    Ok(Instance::new(UserRepository { db: args.required(0)? }))
                }),
            )
            .build_child(&app)?;

        let repo = request.get_as::<UserRepository>(&repository)?;
        println!("👤 {}", repo.find_user(request_id));

        print!("{}", app.snapshot()?.render());
        request.dispose()?;
    }

    // Disposing the root closes the shared database
    app.dispose()?;

    println!("\n🎉 Everything works!");
    Ok(())
}

use campus_application::SessionRuntime;

pub fn show(runtime: &SessionRuntime) {
    let session = runtime.session();
    match session.identity() {
        Some(identity) => {
            println!("✅ Logged in as {}", identity.role());
            if let Some(name) = identity.display_name() {
                println!("   name: {}", name);
            }
        }
        None => println!("🔒 Not logged in"),
    }
}

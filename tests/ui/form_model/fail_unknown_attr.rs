#[derive(formsync::FormModel)]
struct Profile {
    #[form(label = "Name")]
    name: String,
}

fn main() {
    let profile = Profile { name: String::new() };
    let _ = profile.name;
}

#[derive(formsync::FormModel)]
enum Choice {
    Yes,
    No,
}

fn main() {
    let _ = [Choice::Yes, Choice::No];
}

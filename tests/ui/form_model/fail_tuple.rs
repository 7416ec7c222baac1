#[derive(formsync::FormModel)]
struct Pair(String, u64);

fn main() {
    let pair = Pair(String::new(), 0);
    let _ = (pair.0, pair.1);
}

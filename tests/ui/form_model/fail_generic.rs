#[derive(formsync::FormModel)]
struct Wrapper<T> {
    value: T,
}

fn main() {
    let wrapper = Wrapper { value: 1u8 };
    let _ = wrapper.value;
}

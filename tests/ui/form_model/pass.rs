use formsync::{FieldLens, FieldNode, FormModel};

#[derive(Clone, PartialEq, formsync::FormModel)]
struct DemoForm {
    email: String,
    #[form(rename = "display_name")]
    nickname: String,
    #[form(skip)]
    revision: u64,
}

fn main() {
    let fields = DemoForm::fields();
    let lens = fields.email();
    let mut model = DemoForm {
        email: "a@formsync.dev".to_string(),
        nickname: "a".to_string(),
        revision: 1,
    };
    lens.set(&mut model, "b@formsync.dev".to_string());
    assert_eq!(lens.key().as_str(), "email");
    assert_eq!(lens.get(&model), "b@formsync.dev");
    assert_eq!(fields.nickname().key().as_str(), "display_name");
    assert_eq!(DemoFormFields::KEYS.len(), 2);
    assert_eq!(model.revision, 1);

    let root = FieldNode::new(model);
    let email = root.create_child(fields.email());
    assert_eq!(email.value(), "b@formsync.dev");
    assert_eq!(email.path(), "email");
}

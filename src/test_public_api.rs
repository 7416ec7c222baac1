use futures::executor::block_on;

#[derive(Clone, Debug, PartialEq, crate::FormModel)]
struct ApiSmokeForm {
    title: String,
    enabled: bool,
    tags: Vec<String>,
}

fn smoke_value() -> ApiSmokeForm {
    ApiSmokeForm {
        title: "draft".into(),
        enabled: false,
        tags: vec!["a".into()],
    }
}

#[test]
fn root_facade_exports_core_types() {
    let _ = crate::FieldOptions::default();
    let _ = crate::FormSnapshot::default();
    let _ = crate::Errors::new();
    let _ = crate::CancellationToken::new();
    let _ = crate::TaskQueue::new();
    assert!(crate::FormError::Aborted.is_aborted());
}

#[test]
fn form_public_api_smoke_compiles() {
    use crate::prelude::*;

    let form = Form::new(smoke_value(), |_: SubmitRequest<ApiSmokeForm>| async {
        Ok::<(), BoxError>(())
    });
    let fields = ApiSmokeForm::fields();

    let title = form.root().create_child(fields.title());
    let title_connection = title.connect().expect("connect title");
    let tags = form.root().create_list_child(fields.tags());
    let tags_connection = tags.connect().expect("connect tags");
    let required = title
        .add_validator(
            "required",
            from_fn(|value: &String| value.trim().is_empty().then_some("required")),
        )
        .expect("register validator");

    title.set_value(String::new());
    title.set_touched();
    tags.append("b".into());
    assert!(form.root().snapshot().errors.contains_key("title"));
    assert_eq!(form.root().value().tags.len(), 2);

    let errors = block_on(form.root().validate_once(smoke_value())).expect("validate once");
    assert!(errors.is_empty());
    block_on(form.submit(None)).expect("submit");

    required.dispose();
    title_connection.dispose();
    tags_connection.dispose();
    form.reset(None);
    run_until_idle();
    assert_eq!(form.root().value(), smoke_value());
}

//! The `Echo` demo service hosted by `hrpc serve`.
//!
//! Every method takes and returns strings so it can be driven from
//! `hrpc call`.

use hrpc_server::ServiceBinding;
use std::convert::Infallible;

pub const SERVICE_NAME: &str = "Echo";

pub fn binding() -> ServiceBinding {
    ServiceBinding::new(SERVICE_NAME)
        .method("ping", |(): ()| async { Ok::<_, Infallible>("pong".to_string()) })
        .method("say", |(text,): (String,)| async move { Ok::<_, Infallible>(text) })
        .method("concat", |(left, right): (String, String)| async move {
            Ok::<_, Infallible>(left + &right)
        })
        .method("upper", |(text,): (String,)| async move {
            Ok::<_, Infallible>(text.to_uppercase())
        })
        .blocking_method("reverse", |(text,): (String,)| {
            Ok::<_, Infallible>(text.chars().rev().collect::<String>())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrpc_common::transport::PayloadCodec;
    use hrpc_common::Request;
    use hrpc_server::Dispatcher;

    async fn call(method: &str, params: &[&str]) -> String {
        let codec = PayloadCodec::default();
        let mut request = Request::new(SERVICE_NAME, method).with_id(1);
        for param in params {
            request = request.push_parameter("string", codec.serialize(*param).unwrap());
        }

        let dispatcher = Dispatcher::builder().service(binding()).build();
        let response = dispatcher.dispatch(request).await;
        codec.deserialize(response.result().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_echo_methods() {
        assert_eq!(call("ping", &[]).await, "pong");
        assert_eq!(call("say", &["hi"]).await, "hi");
        assert_eq!(call("concat", &["foo", "bar"]).await, "foobar");
        assert_eq!(call("upper", &["abc"]).await, "ABC");
        assert_eq!(call("reverse", &["abc"]).await, "cba");
    }

    #[test]
    fn test_all_methods_take_strings() {
        let binding = binding();
        assert_eq!(
            binding.signatures(),
            vec![
                "concat(string, string)",
                "ping()",
                "reverse(string)",
                "say(string)",
                "upper(string)",
            ]
        );
    }
}

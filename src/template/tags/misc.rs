//! Output helpers: comment, filter, spaceless, templateTag, widthRatio,
//! url, csrfToken

use std::collections::HashMap;

use super::{add, no_args, TagCompiler};
use crate::template::error::Result;
use crate::template::node::Node;
use crate::template::parser::{Parser, TagToken};

pub(super) fn register(tags: &mut HashMap<String, TagCompiler>) {
    add(tags, "comment", compile_comment);
    add(tags, "filter", compile_filter);
    add(tags, "spaceless", compile_spaceless);
    add(tags, "templateTag", compile_template_tag);
    add(tags, "widthRatio", compile_width_ratio);
    add(tags, "url", compile_url);
    add(tags, "csrfToken", compile_csrf_token);
}

fn compile_comment(parser: &mut Parser<'_>, _tag: &TagToken) -> Result<Node> {
    parser.skip("endcomment")?;
    Ok(Node::Comment)
}

/// `{% filter upper|escape %}...{% endfilter %}`
fn compile_filter(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    if tag.args.is_empty() {
        return Err(parser.arity_error(tag, "requires a filter chain"));
    }
    let calls = parser.compile_filter_chain(&tag.args, tag.args_offset)?;
    let (body, _) = parser.parse(&["endfilter"])?;
    Ok(Node::FilterBlock {
        calls,
        body: Box::new(body),
    })
}

fn compile_spaceless(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    no_args(parser, tag)?;
    let (body, _) = parser.parse(&["endspaceless"])?;
    Ok(Node::Spaceless(Box::new(body)))
}

fn compile_template_tag(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let literal = match tag.args.as_str() {
        "openblock" => "{%",
        "closeblock" => "%}",
        "openvariable" => "{{",
        "closevariable" => "}}",
        "openbrace" => "{",
        "closebrace" => "}",
        "opencomment" => "{#",
        "closecomment" => "#}",
        other => {
            return Err(parser.error(
                tag.position,
                format!("Unknown templateTag '{}'", other),
            ))
        }
    };
    Ok(Node::TemplateTag(literal))
}

/// `{% widthRatio current max width %}`
fn compile_width_ratio(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let mut args = parser.compile_args(tag)?.into_iter();
    match (args.next(), args.next(), args.next(), args.next()) {
        (Some(current), Some(max), Some(width), None) => Ok(Node::WidthRatio {
            current,
            max,
            width,
        }),
        _ => Err(parser.arity_error(tag, "takes exactly three arguments")),
    }
}

/// `{% url handler [args...] [as name] %}`
fn compile_url(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let args = tag.split_args();
    let (args, target) = match args.as_slice() {
        [rest @ .., (_, "as"), (_, name)] => (rest.to_vec(), Some(name.to_string())),
        _ => (args.clone(), None),
    };

    let mut exprs = Vec::with_capacity(args.len());
    for (offset, arg) in args {
        exprs.push(parser.compile_expr(arg, offset)?);
    }
    if exprs.is_empty() {
        return Err(parser.arity_error(tag, "requires a route name"));
    }
    let handler = exprs.remove(0);

    Ok(Node::Url {
        handler,
        args: exprs,
        target,
    })
}

fn compile_csrf_token(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    no_args(parser, tag)?;
    Ok(Node::CsrfToken)
}

#[cfg(test)]
mod tests {
    use crate::template::{Context, Environment, TemplateError, Value};

    fn render_with(env: &Environment, source: &str, ctx: &Context) -> String {
        env.compile(source).unwrap().render(env, ctx).unwrap()
    }

    fn render(source: &str) -> String {
        render_with(&Environment::new(), source, &Context::new())
    }

    #[test]
    fn test_comment_block() {
        assert_eq!(render("a{% comment %}{% bogus %}{{ x|nope }}{% endcomment %}b"), "ab");
        let err = Environment::new().compile("{% comment %}never closed").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_filter_block() {
        assert_eq!(render("{% filter upper %}Hi {{ 'there' }}{% endfilter %}"), "HI THERE");
        assert_eq!(
            render("{% filter lower|cut:\" \" %}A B <i>{% endfilter %}"),
            "ab<i>"
        );
        assert_eq!(
            render("{% filter forceEscape %}<i>{% endfilter %}"),
            "&lt;i&gt;"
        );
    }

    #[test]
    fn test_filter_block_rejects_bad_chain() {
        assert!(Environment::new().compile("{% filter %}{% endfilter %}").is_err());
        assert!(Environment::new().compile("{% filter nope %}{% endfilter %}").is_err());
        assert!(Environment::new().compile("{% filter upper lower %}{% endfilter %}").is_err());
    }

    #[test]
    fn test_spaceless() {
        assert_eq!(render("{% spaceless %}\n<p>\n  <a>x</a>\n</p>\n{% endspaceless %}"), "<p><a>x</a></p>");
    }

    #[test]
    fn test_template_tag() {
        assert_eq!(
            render("{% templateTag openblock %} x {% templateTag closevariable %}"),
            "{% x }}"
        );
        assert!(Environment::new().compile("{% templateTag nope %}").is_err());
    }

    #[test]
    fn test_width_ratio() {
        let env = Environment::new();
        let mut ctx = Context::new();
        ctx.set("value", 175);
        ctx.set("max", 200);
        assert_eq!(render_with(&env, "{% widthRatio value max 100 %}", &ctx), "88");
        assert_eq!(render("{% widthRatio 1 0 100 %}"), "0");
        assert!(env.compile("{% widthRatio 1 2 %}").is_err());
    }

    #[test]
    fn test_url_reverse() {
        let env = Environment::new().with_reverse(|name: &str, args: &[Value]| {
            let parts: Vec<String> = args.iter().map(Value::to_output_string).collect();
            Ok(format!("/{}/{}", name, parts.join("/")))
        });
        let mut ctx = Context::new();
        ctx.set("id", 7);
        assert_eq!(render_with(&env, "{% url 'post' id %}", &ctx), "/post/7");
        assert_eq!(
            render_with(&env, "{% url 'post' id as link %}<a href=\"{{ link }}\">", &ctx),
            "<a href=\"/post/7\">"
        );
    }

    #[test]
    fn test_url_without_reverser() {
        let env = Environment::new();
        let template = env.compile("{% url 'home' %}").unwrap();
        let err = template.render(&env, &Context::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }

    #[test]
    fn test_csrf_token() {
        let env = Environment::new();
        let mut ctx = Context::new();
        ctx.set("csrf_token", "abc\"1");
        assert_eq!(
            render_with(&env, "{% csrfToken %}", &ctx),
            "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"abc&quot;1\">"
        );
        assert_eq!(render("{% csrfToken %}"), "");
        assert!(env.compile("{% csrfToken now %}").is_err());
    }
}

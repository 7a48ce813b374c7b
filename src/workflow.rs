pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ask {
    pub prompt: &'static str,
    pub masked: bool,
}

impl Ask {
    fn plain(prompt: &'static str) -> Self {
        Self {
            prompt,
            masked: false,
        }
    }

    fn secret(prompt: &'static str) -> Self {
        Self {
            prompt,
            masked: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<F, R> {
    Next {
        flow: F,
        ask: Ask,
        error: Option<&'static str>,
    },
    Done(R),
}

impl<F, R> Step<F, R> {
    fn ask(flow: F, ask: Ask) -> Self {
        Step::Next {
            flow,
            ask,
            error: None,
        }
    }

    fn retry(flow: F, ask: Ask, error: &'static str) -> Self {
        Step::Next {
            flow,
            ask,
            error: Some(error),
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .find('.')
                    .map(|dot| dot > 0 && dot + 1 < domain.len())
                    .unwrap_or(false)
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFlow {
    Username,
    Password { username: String },
}

impl LoginFlow {
    pub fn start() -> (Self, Ask) {
        (LoginFlow::Username, Ask::plain("Username: "))
    }

    pub fn advance(self, input: &str) -> Step<Self, Credentials> {
        match self {
            LoginFlow::Username => {
                let username = input.trim();
                if username.is_empty() {
                    return Step::retry(self, Ask::plain("Username: "), "Username required");
                }
                Step::ask(
                    LoginFlow::Password {
                        username: username.to_string(),
                    },
                    Ask::secret("Password: "),
                )
            }
            LoginFlow::Password { username } => {
                if input.is_empty() {
                    return Step::retry(
                        LoginFlow::Password { username },
                        Ask::secret("Password: "),
                        "Password required",
                    );
                }
                Step::Done(Credentials {
                    username,
                    password: input.to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterFlow {
    Username,
    Password {
        username: String,
    },
    Email {
        username: String,
        password: String,
    },
    Confirm {
        username: String,
        password: String,
        email: String,
    },
}

impl RegisterFlow {
    pub fn start() -> (Self, Ask) {
        (RegisterFlow::Username, Ask::plain("Choose a username: "))
    }

    pub fn advance(self, input: &str) -> Step<Self, Registration> {
        match self {
            RegisterFlow::Username => {
                let username = input.trim();
                if username.is_empty() {
                    return Step::retry(
                        self,
                        Ask::plain("Choose a username: "),
                        "Username required",
                    );
                }
                Step::ask(
                    RegisterFlow::Password {
                        username: username.to_string(),
                    },
                    Ask::secret("Password: "),
                )
            }
            RegisterFlow::Password { username } => {
                if input.chars().count() < MIN_PASSWORD_LEN {
                    return Step::retry(
                        RegisterFlow::Password { username },
                        Ask::secret("Password: "),
                        "Password must be at least 8 characters",
                    );
                }
                Step::ask(
                    RegisterFlow::Email {
                        username,
                        password: input.to_string(),
                    },
                    Ask::plain("Email: "),
                )
            }
            RegisterFlow::Email { username, password } => {
                let email = input.trim();
                if !is_valid_email(email) {
                    return Step::retry(
                        RegisterFlow::Email { username, password },
                        Ask::plain("Email: "),
                        "Invalid email address",
                    );
                }
                Step::ask(
                    RegisterFlow::Confirm {
                        username,
                        password,
                        email: email.to_string(),
                    },
                    Ask::secret("Confirm password: "),
                )
            }
            RegisterFlow::Confirm {
                username,
                password,
                email,
            } => {
                if input != password {
                    // Back to the password; the email is asked again.
                    return Step::retry(
                        RegisterFlow::Password { username },
                        Ask::secret("Password: "),
                        "Passwords do not match",
                    );
                }
                Step::Done(Registration {
                    username,
                    password,
                    email,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRegistration {
    pub code: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterEmailFlow {
    Code,
    Email { code: String },
    Name { code: String, email: String },
}

impl RegisterEmailFlow {
    pub fn start() -> (Self, Ask) {
        (RegisterEmailFlow::Code, Ask::secret("Registration code: "))
    }

    pub fn advance(self, input: &str) -> Step<Self, EmailRegistration> {
        match self {
            RegisterEmailFlow::Code => {
                let code = input.trim();
                if code.is_empty() {
                    return Step::retry(
                        self,
                        Ask::secret("Registration code: "),
                        "Registration code required",
                    );
                }
                Step::ask(
                    RegisterEmailFlow::Email {
                        code: code.to_string(),
                    },
                    Ask::plain("Email: "),
                )
            }
            RegisterEmailFlow::Email { code } => {
                let email = input.trim();
                if !is_valid_email(email) {
                    return Step::retry(
                        RegisterEmailFlow::Email { code },
                        Ask::plain("Email: "),
                        "Invalid email address",
                    );
                }
                Step::ask(
                    RegisterEmailFlow::Name {
                        code,
                        email: email.to_string(),
                    },
                    Ask::plain("Your name: "),
                )
            }
            RegisterEmailFlow::Name { code, email } => {
                let name = input.trim();
                if name.is_empty() {
                    return Step::retry(
                        RegisterEmailFlow::Name { code, email },
                        Ask::plain("Your name: "),
                        "Name required",
                    );
                }
                Step::Done(EmailRegistration {
                    code,
                    email,
                    name: name.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_valid_email, Credentials, LoginFlow, RegisterEmailFlow, RegisterFlow, Registration, Step,
    };
    use pretty_assertions::assert_eq;

    fn next<F, R: std::fmt::Debug>(step: Step<F, R>) -> (F, Option<&'static str>) {
        match step {
            Step::Next { flow, error, .. } => (flow, error),
            Step::Done(done) => panic!("flow finished early: {done:?}"),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ana@example.org"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("ana@.org"));
        assert!(!is_valid_email("ana@example."));
        assert!(!is_valid_email("ana.example.org"));
    }

    #[test]
    fn login_collects_username_then_password() {
        let (flow, ask) = LoginFlow::start();
        assert!(!ask.masked);
        let (flow, error) = next(flow.advance("  "));
        assert_eq!(error, Some("Username required"));
        let (flow, error) = next(flow.advance(" ana "));
        assert_eq!(error, None);
        match flow.advance("hunter22") {
            Step::Done(creds) => assert_eq!(
                creds,
                Credentials {
                    username: "ana".into(),
                    password: "hunter22".into()
                }
            ),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn password_prompts_are_masked() {
        let (flow, _) = RegisterFlow::start();
        match flow.advance("ana") {
            Step::Next { ask, .. } => assert!(ask.masked),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn register_validates_each_step() {
        let (flow, _) = RegisterFlow::start();
        let (flow, _) = next(flow.advance("ana"));
        let (flow, error) = next(flow.advance("short"));
        assert_eq!(error, Some("Password must be at least 8 characters"));
        let (flow, _) = next(flow.advance("long enough"));
        let (flow, error) = next(flow.advance("not-an-email"));
        assert_eq!(error, Some("Invalid email address"));
        let (flow, _) = next(flow.advance("ana@example.org"));

        let (restarted, error) = next(flow.clone().advance("different"));
        assert_eq!(error, Some("Passwords do not match"));
        assert_eq!(
            restarted,
            RegisterFlow::Password {
                username: "ana".into()
            }
        );

        match flow.advance("long enough") {
            Step::Done(reg) => assert_eq!(
                reg,
                Registration {
                    username: "ana".into(),
                    password: "long enough".into(),
                    email: "ana@example.org".into()
                }
            ),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn email_registration_asks_code_email_name() {
        let (flow, ask) = RegisterEmailFlow::start();
        assert_eq!(ask.prompt, "Registration code: ");
        let (flow, _) = next(flow.advance("gate"));
        let (flow, _) = next(flow.advance("ana@example.org"));
        let (flow, error) = next(flow.advance(""));
        assert_eq!(error, Some("Name required"));
        match flow.advance("Ana") {
            Step::Done(reg) => {
                assert_eq!(reg.code, "gate");
                assert_eq!(reg.email, "ana@example.org");
                assert_eq!(reg.name, "Ana");
            }
            other => panic!("expected done, got {other:?}"),
        }
    }
}
